//! 服务代理
//!
//! 把 `(方法名, 有序参数)` 调用转换为一次远程请求：
//! 选实例 → 编码 → 建连 → 发送 → 读取完整响应帧 → 解码。
//! 每次调用使用一个新连接，所有套接字操作都有超时。

use super::descriptor::ServiceDescriptor;
use crate::config::RpcConfig;
use crate::error::{Result, RpcError};
use crate::protocol::{
    CompressorType, MessageCodec, MessageType, ProtocolMessage, RpcRequest, RpcResponse,
};
use crate::registry::{LoadBalancer, ServiceInstance};
use crate::retry::RetryPolicy;
use crate::serializer::{Serializer, SerializerRegistry};
use crate::value::Value;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

#[derive(Default)]
struct CacheState {
    instances: Arc<Vec<ServiceInstance>>,
    /// 订阅回调已送达过快照
    notified: bool,
}

/// 实例缓存：订阅回调整体替换快照，调用路径只读取快照
///
/// 启动时先订阅再拉取初始列表；初始列表只在订阅回调尚未送达时写入，
/// 避免较旧的列表覆盖较新的通知。
#[derive(Default)]
pub(crate) struct InstanceCache {
    state: RwLock<CacheState>,
}

impl InstanceCache {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 订阅回调送达的快照总是生效
    pub(crate) fn replace(&self, instances: &[ServiceInstance]) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.instances = Arc::new(instances.to_vec());
        state.notified = true;
    }

    /// 写入初始列表，返回是否生效
    pub(crate) fn seed(&self, instances: Vec<ServiceInstance>) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.notified {
            return false;
        }
        state.instances = Arc::new(instances);
        true
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<ServiceInstance>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .clone()
    }
}

/// 服务代理
pub struct ServiceProxy {
    service_name: String,
    descriptor: ServiceDescriptor,
    config: RpcConfig,
    instances: Arc<InstanceCache>,
    balancer: LoadBalancer,
    serializer: Arc<dyn Serializer>,
    serializers: Arc<SerializerRegistry>,
    retry: Arc<dyn RetryPolicy>,
    next_request_id: AtomicU64,
}

impl ServiceProxy {
    pub(crate) fn new(
        descriptor: ServiceDescriptor,
        config: RpcConfig,
        instances: Arc<InstanceCache>,
        serializers: Arc<SerializerRegistry>,
    ) -> Result<Self> {
        let serializer = serializers.get(config.serializer_type)?;
        let retry = config.retry_policy()?;
        Ok(Self {
            service_name: config.service_name.clone(),
            balancer: LoadBalancer::new(config.load_balance),
            descriptor,
            config,
            instances,
            serializer,
            serializers,
            retry,
            next_request_id: AtomicU64::new(1),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// 当前缓存的实例快照
    pub fn instances(&self) -> Arc<Vec<ServiceInstance>> {
        self.instances.snapshot()
    }

    /// 调用远程方法
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.descriptor.check(&self.service_name, method, args.len())?;

        let request = RpcRequest::new(self.service_name.clone(), method, args);
        let body = Bytes::from(self.serializer.serialize(&Value::from(request))?);

        let mut attempt = 0;
        loop {
            let instance = self.select_instance()?;
            let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

            match self.call_instance(&instance, request_id, body.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if self.retry.should_retry(attempt, &e) => {
                    let backoff = self.retry.backoff_duration(attempt);
                    warn!(
                        service = %self.service_name,
                        method = %method,
                        address = %instance.address(),
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "🔁 Retrying after transport failure"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(
                        service = %self.service_name,
                        method = %method,
                        category = %e.category(),
                        error = %e,
                        "RPC call failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// 带目标类型的调用
    pub async fn call<T>(&self, method: &str, args: Vec<Value>) -> Result<T>
    where
        T: TryFrom<Value, Error = RpcError>,
    {
        T::try_from(self.invoke(method, args).await?)
    }

    fn select_instance(&self) -> Result<ServiceInstance> {
        let snapshot = self.instances();
        self.balancer
            .select(&snapshot)
            .cloned()
            .ok_or_else(|| RpcError::NoAvailableInstance(self.service_name.clone()))
    }

    async fn call_instance(
        &self,
        instance: &ServiceInstance,
        request_id: u64,
        body: Bytes,
    ) -> Result<Value> {
        let timeout = self.config.timeout();
        let address = instance.address();

        let stream = with_timeout(timeout, "connect", TcpStream::connect(address.as_str()))
            .await?
            .map_err(|e| RpcError::transport(format!("connect to {} failed: {}", address, e)))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(address = %address, error = %e, "Failed to set TCP_NODELAY");
        }
        let mut framed = Framed::new(stream, MessageCodec::new());

        let request = ProtocolMessage::request(self.serializer.serializer_type(), request_id, body);
        with_timeout(timeout, "send", framed.send(request)).await??;

        let response = with_timeout(timeout, "receive", framed.next())
            .await?
            .ok_or_else(|| {
                RpcError::transport(format!("{} closed the connection before responding", address))
            })??;

        self.decode_response(response, request_id)
    }

    fn decode_response(&self, response: ProtocolMessage, request_id: u64) -> Result<Value> {
        if response.kind()? != MessageType::Response {
            return Err(RpcError::protocol(format!(
                "expected a response frame, got message type {}",
                response.message_type
            )));
        }
        if response.request_id != request_id {
            return Err(RpcError::protocol(format!(
                "response id {} does not match request id {}",
                response.request_id, request_id
            )));
        }
        if response.compressor()? != CompressorType::None {
            return Err(RpcError::protocol(format!(
                "compressor {} is not supported",
                response.compressor_type
            )));
        }

        let serializer = self.serializers.get_by_tag(response.serializer_type)?;
        let value = serializer.deserialize(&response.body)?;
        RpcResponse::try_from(value)?.into_result()
    }
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("service_name", &self.service_name)
            .field("descriptor", &self.descriptor)
            .field("serializer", &self.serializer.serializer_type())
            .field("instances", &self.instances().len())
            .finish()
    }
}

async fn with_timeout<F: Future>(duration: Duration, op: &str, fut: F) -> Result<F::Output> {
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| RpcError::timeout(format!("{} timed out after {}ms", op, duration.as_millis())))
}
