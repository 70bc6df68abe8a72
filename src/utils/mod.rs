//! 工具函数模块

use crate::error::{Result, RpcError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// 等待服务启动就绪（通过 TCP 连接重试）
///
/// 使用指数退避策略重试连接，直到服务真正可以接受连接，或 `total_timeout` 耗尽。
///
/// # 示例
/// ```rust,no_run
/// use flare_rpc::utils::wait_for_server_ready;
/// use std::time::Duration;
///
/// # async fn example() -> flare_rpc::Result<()> {
/// wait_for_server_ready("127.0.0.1:9000".parse().unwrap(), Duration::from_secs(5)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn wait_for_server_ready(address: SocketAddr, total_timeout: Duration) -> Result<()> {
    const INITIAL_DELAY_MS: u64 = 20;
    const MAX_DELAY_MS: u64 = 500;

    let start = std::time::Instant::now();
    let mut delay_ms = INITIAL_DELAY_MS;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match timeout(Duration::from_millis(100), TcpStream::connect(address)).await {
            Ok(Ok(_)) => {
                debug!(
                    address = %address,
                    attempts = attempt,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Server is ready"
                );
                return Ok(());
            }
            Ok(Err(e)) => {
                debug!(address = %address, attempt, error = %e, "Connection attempt failed, retrying...");
            }
            Err(_) => {
                debug!(address = %address, attempt, "Connection attempt timed out, retrying...");
            }
        }

        if start.elapsed() >= total_timeout {
            return Err(RpcError::timeout(format!(
                "server at {} not ready after {} attempts",
                address, attempt
            )));
        }

        sleep(Duration::from_millis(delay_ms)).await;
        delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
    }
}

/// 申请一个当前空闲的本地端口
pub async fn free_local_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}
