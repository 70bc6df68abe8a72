//! 重试策略模块

pub mod exponential;
pub mod fixed;

pub use exponential::ExponentialBackoffPolicy;
pub use fixed::FixedRetryPolicy;

use crate::error::RpcError;
use std::time::Duration;

/// 重试策略 trait
///
/// `attempt` 为已经失败的重试次数（首次调用失败时为 0）
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, attempt: usize, error: &RpcError) -> bool;
    fn backoff_duration(&self, attempt: usize) -> Duration;
    fn max_attempts(&self) -> usize;
}
