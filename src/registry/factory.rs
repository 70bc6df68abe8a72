//! 注册中心工厂
//!
//! 按 `(registry_type, address, namespace)` 创建并缓存注册中心，
//! 相同配置的 provider 与 consumer 共享同一个实例。

use super::memory::MemoryRegistry;
use super::remote::{RemoteRegistry, RemoteRegistryOptions};
use super::store::RedisStore;
use super::trait_def::SharedRegistry;
use crate::config::{RegistryConfig, RegistryType};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistryKey {
    registry_type: RegistryType,
    address: String,
    namespace: String,
}

impl From<&RegistryConfig> for RegistryKey {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            registry_type: config.registry_type,
            address: config.address.clone(),
            namespace: config.namespace.clone(),
        }
    }
}

/// 注册中心工厂
#[derive(Default)]
pub struct RegistryFactory {
    registries: Mutex<HashMap<RegistryKey, SharedRegistry>>,
}

impl RegistryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建注册中心
    pub async fn get_or_create(&self, config: &RegistryConfig) -> Result<SharedRegistry> {
        let key = RegistryKey::from(config);
        let mut registries = self.registries.lock().await;
        if let Some(registry) = registries.get(&key) {
            return Ok(registry.clone());
        }

        config.validate()?;
        let registry: SharedRegistry = match config.registry_type {
            RegistryType::Memory => Arc::new(MemoryRegistry::new()),
            RegistryType::Redis => {
                let options = RemoteRegistryOptions::from_config(config)?;
                let store = RedisStore::connect(config).await?;
                Arc::new(RemoteRegistry::new(store, options))
            }
        };
        info!(
            registry_type = %config.registry_type,
            address = %config.address,
            namespace = %config.namespace,
            "📒 Registry created"
        );
        registries.insert(key, registry.clone());
        Ok(registry)
    }

    /// 放入预先构建的注册中心，替换同键的已有实例
    pub async fn insert(&self, config: &RegistryConfig, registry: SharedRegistry) {
        self.registries
            .lock()
            .await
            .insert(RegistryKey::from(config), registry);
    }

    /// 关闭并移除全部注册中心
    pub async fn close_all(&self) {
        let registries: Vec<SharedRegistry> =
            self.registries.lock().await.drain().map(|(_, r)| r).collect();
        for registry in registries {
            if let Err(e) = registry.close().await {
                warn!(error = %e, "⚠️ Failed to close registry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceInstance;

    #[tokio::test]
    async fn same_key_shares_one_registry() {
        let factory = RegistryFactory::new();
        let a = factory.get_or_create(&RegistryConfig::memory()).await.unwrap();
        let b = factory.get_or_create(&RegistryConfig::memory()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        a.register(ServiceInstance::new("echo", "h", 1)).await.unwrap();
        assert_eq!(b.list_instances("echo").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn different_namespaces_are_isolated() {
        let factory = RegistryFactory::new();
        let a = factory
            .get_or_create(&RegistryConfig::memory().with_namespace("a"))
            .await
            .unwrap();
        let b = factory
            .get_or_create(&RegistryConfig::memory().with_namespace("b"))
            .await
            .unwrap();

        a.register(ServiceInstance::new("echo", "h", 1)).await.unwrap();
        assert!(b.list_instances("echo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inserted_registry_is_returned() {
        let factory = RegistryFactory::new();
        let config = RegistryConfig::redis("unreachable:1");
        let custom: SharedRegistry = Arc::new(MemoryRegistry::new());
        factory.insert(&config, custom.clone()).await;

        let got = factory.get_or_create(&config).await.unwrap();
        assert!(Arc::ptr_eq(&got, &custom));
    }
}
