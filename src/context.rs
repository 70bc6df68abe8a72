//! RPC 上下文
//!
//! 持有注册中心工厂与序列化器注册表，显式传入 provider / consumer，
//! 不依赖任何进程级全局状态。

use crate::config::RegistryConfig;
use crate::error::Result;
use crate::registry::{RegistryFactory, SharedRegistry};
use crate::serializer::SerializerRegistry;
use std::sync::Arc;
use tracing::info;

/// RPC 上下文，克隆开销很小，克隆之间共享同一组注册中心
#[derive(Clone, Default)]
pub struct RpcContext {
    registries: Arc<RegistryFactory>,
    serializers: Arc<SerializerRegistry>,
}

impl RpcContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用自定义序列化器注册表
    pub fn with_serializers(serializers: SerializerRegistry) -> Self {
        Self {
            registries: Arc::new(RegistryFactory::new()),
            serializers: Arc::new(serializers),
        }
    }

    /// 按配置获取（或创建）注册中心
    pub async fn registry(&self, config: &RegistryConfig) -> Result<SharedRegistry> {
        self.registries.get_or_create(config).await
    }

    pub fn registry_factory(&self) -> &RegistryFactory {
        &self.registries
    }

    pub fn serializers(&self) -> Arc<SerializerRegistry> {
        self.serializers.clone()
    }

    /// 关闭上下文持有的全部注册中心
    pub async fn shutdown(&self) {
        self.registries.close_all().await;
        info!("RPC context shut down");
    }
}
