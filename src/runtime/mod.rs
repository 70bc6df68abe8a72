//! 运行时支持
//!
//! 任务生命周期相关的配置与有界关闭

pub mod config;

pub use config::RuntimeConfig;

use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// 在限定时间内等待所有任务结束，超时后中止剩余任务
///
/// 返回是否全部在时限内正常结束
pub async fn wait_for_tasks_shutdown(timeout: Duration, join_set: &mut JoinSet<()>) -> bool {
    let total = join_set.len();
    match tokio::time::timeout(timeout, async {
        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!(error = %e, "Task panicked during shutdown");
                } else {
                    debug!(error = %e, "Task cancelled during shutdown");
                }
            }
        }
    })
    .await
    {
        Ok(()) => {
            info!(tasks = total, "All tasks completed");
            true
        }
        Err(_) => {
            warn!(
                remaining = join_set.len(),
                timeout_ms = timeout.as_millis() as u64,
                "⏱️ Tasks shutdown timeout, aborting stragglers"
            );
            join_set.abort_all();
            false
        }
    }
}
