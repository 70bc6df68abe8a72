//! 日志初始化
//!
//! 默认级别为 `info`，可通过 `RUST_LOG` 覆盖。

use crate::error::{Result, RpcError};
use tracing_subscriber::EnvFilter;

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// 安装全局 tracing subscriber
///
/// 重复调用会返回 `Configuration` 错误，调用方可以忽略。
pub fn init_tracing(default_level: &str, format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| RpcError::configuration(format!("failed to install tracing subscriber: {}", e)))
}
