//! Provider 网络层
//!
//! 每个监听地址一个 accept 任务，每个连接一个任务；连接内部按顺序处理请求。
//! 分发失败和业务失败都转换为错误响应，只有传输错误、协议错误、
//! 空闲超时或关闭信号才会结束连接。

use super::service::{RpcService, ServiceError};
use crate::error::{Result, RpcError};
use crate::protocol::{
    CompressorType, MessageCodec, MessageType, ProtocolMessage, RpcRequest, RpcResponse,
};
use crate::runtime::{RuntimeConfig, wait_for_tasks_shutdown};
use crate::serializer::{Serializer, SerializerRegistry};
use crate::value::Value;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// 请求分发器：服务名 → 实现
pub(crate) struct Dispatcher {
    services: HashMap<String, Arc<dyn RpcService>>,
    serializers: Arc<SerializerRegistry>,
}

impl Dispatcher {
    pub(crate) fn new(
        services: HashMap<String, Arc<dyn RpcService>>,
        serializers: Arc<SerializerRegistry>,
    ) -> Self {
        Self {
            services,
            serializers,
        }
    }

    /// 处理一帧请求，返回响应帧
    ///
    /// 返回 `Err` 表示协议错误，调用方应关闭连接
    pub(crate) async fn handle(&self, message: ProtocolMessage) -> Result<ProtocolMessage> {
        if message.kind()? != MessageType::Request {
            return Err(RpcError::protocol(format!(
                "expected a request frame, got message type {}",
                message.message_type
            )));
        }
        if message.compressor()? != CompressorType::None {
            return Err(RpcError::protocol(format!(
                "compressor {} is not supported",
                message.compressor_type
            )));
        }
        let serializer = self.serializers.get_by_tag(message.serializer_type)?;

        let response = match serializer
            .deserialize(&message.body)
            .and_then(RpcRequest::try_from)
        {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                warn!(request_id = message.request_id, error = %e, "⚠️ Malformed request payload");
                RpcResponse::error(format!("bad request payload: {}", e))
            }
        };

        let body = encode_response(serializer.as_ref(), response)?;
        Ok(ProtocolMessage::response(
            serializer.serializer_type(),
            message.request_id,
            body,
        ))
    }

    async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest {
            service_name,
            method_name,
            args,
        } = request;

        let Some(service) = self.services.get(&service_name).cloned() else {
            warn!(service = %service_name, method = %method_name, "⚠️ Service not found");
            return RpcResponse::error(format!("service not found: {}", service_name));
        };

        // 处理函数在独立任务中运行，panic 只影响本次调用；
        // 分发被取消（超时、连接关闭）时任务随守卫一起中止
        let method = method_name.clone();
        let mut handler = AbortOnDrop(tokio::spawn(async move {
            service.call(&method, args).await
        }));
        let outcome = (&mut handler.0).await;

        match outcome {
            Ok(Ok(data)) => {
                debug!(service = %service_name, method = %method_name, "Request handled");
                RpcResponse::success(data)
            }
            Ok(Err(ServiceError::MethodNotFound(_))) => {
                warn!(service = %service_name, method = %method_name, "⚠️ Method not found");
                RpcResponse::error(format!(
                    "method not found: {}.{}",
                    service_name, method_name
                ))
            }
            Ok(Err(e)) => {
                warn!(
                    service = %service_name,
                    method = %method_name,
                    error = %e,
                    "⚠️ Service method failed"
                );
                RpcResponse::error(e.to_string())
            }
            Err(join_error) => {
                error!(
                    service = %service_name,
                    method = %method_name,
                    error = %join_error,
                    "❌ Service method panicked"
                );
                RpcResponse::error(format!(
                    "method {}.{} panicked",
                    service_name, method_name
                ))
            }
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 编码响应；结果本身无法编码时退化为错误响应
fn encode_response(serializer: &dyn Serializer, response: RpcResponse) -> Result<Vec<u8>> {
    match serializer.serialize(&Value::from(response)) {
        Ok(body) => Ok(body),
        Err(e) => {
            warn!(error = %e, "⚠️ Failed to encode response, sending error instead");
            serializer.serialize(&Value::from(RpcResponse::error(format!(
                "failed to encode response: {}",
                e
            ))))
        }
    }
}

/// 绑定监听地址
pub(crate) async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .map_err(|e| RpcError::transport(format!("failed to bind {}:{}: {}", host, port, e)))
}

/// accept 循环：收到关闭信号后关闭监听套接字，并在限定时间内等待连接任务结束
pub(crate) async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    config: RuntimeConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let local_addr = listener.local_addr().ok();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "🔌 Connection accepted");
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        dispatcher.clone(),
                        config.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "⚠️ Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    info!(address = ?local_addr, "🛑 Listener closed");
    wait_for_tasks_shutdown(config.shutdown_timeout, &mut connections).await;
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    config: RuntimeConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut framed = Framed::new(stream, MessageCodec::new());

    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = tokio::time::timeout(config.idle_timeout, framed.next()) => next,
        };

        let message = match next {
            Err(_) => {
                debug!(peer = %peer, "Connection idle, closing");
                break;
            }
            Ok(None) => {
                debug!(peer = %peer, "Connection closed by peer");
                break;
            }
            Ok(Some(Err(e))) => {
                warn!(peer = %peer, error = %e, "⚠️ Failed to read frame, closing connection");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        let request_id = message.request_id;
        let response = match dispatcher.handle(message).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    peer = %peer,
                    request_id,
                    error = %e,
                    "⚠️ Protocol error, closing connection"
                );
                break;
            }
        };

        match tokio::time::timeout(config.io_timeout, framed.send(response)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(peer = %peer, request_id, error = %e, "⚠️ Failed to write response");
                break;
            }
            Err(_) => {
                warn!(peer = %peer, request_id, "⚠️ Response write timed out");
                break;
            }
        }
    }
}
