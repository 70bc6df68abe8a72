//! Consumer 启动器
//!
//! `add_service` 只记录声明；`start` 为每个带注册中心的服务先订阅变更、
//! 再拉取初始实例列表并构建 [`ServiceProxy`]，任一服务失败则回滚已建立的订阅。

use super::descriptor::ServiceDescriptor;
use super::proxy::{InstanceCache, ServiceProxy};
use crate::config::{RegistryConfig, RpcConfig};
use crate::context::RpcContext;
use crate::error::{Result, RpcError};
use crate::registry::{InstanceListener, ServiceInstance, SharedRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct ConsumerEntry {
    descriptor: ServiceDescriptor,
    registry_config: Option<RegistryConfig>,
    rpc_config: RpcConfig,
}

/// Consumer 启动器
pub struct ConsumerBootstrap {
    context: RpcContext,
    entries: HashMap<String, ConsumerEntry>,
    proxies: HashMap<String, Arc<ServiceProxy>>,
    subscriptions: Vec<(SharedRegistry, String)>,
    started: bool,
}

impl ConsumerBootstrap {
    pub fn new(context: RpcContext) -> Self {
        Self {
            context,
            entries: HashMap::new(),
            proxies: HashMap::new(),
            subscriptions: Vec::new(),
            started: false,
        }
    }

    /// 声明远程服务，使用默认调用配置
    pub fn add_service(
        &mut self,
        name: impl Into<String>,
        descriptor: ServiceDescriptor,
        registry_config: Option<RegistryConfig>,
    ) -> &mut Self {
        let name = name.into();
        let rpc_config = RpcConfig::new(name.clone());
        self.add_service_with_config(name, descriptor, registry_config, rpc_config)
    }

    /// 声明远程服务并指定调用配置；`rpc_config.service_name` 以 `name` 为准
    pub fn add_service_with_config(
        &mut self,
        name: impl Into<String>,
        descriptor: ServiceDescriptor,
        registry_config: Option<RegistryConfig>,
        mut rpc_config: RpcConfig,
    ) -> &mut Self {
        let name = name.into();
        rpc_config.service_name = name.clone();
        self.entries.insert(
            name,
            ConsumerEntry {
                descriptor,
                registry_config,
                rpc_config,
            },
        );
        self
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            warn!("Consumer already started");
            return Ok(());
        }

        info!(services = self.entries.len(), "🚀 Starting consumer");
        match self.build_proxies().await {
            Ok(proxies) => {
                self.proxies = proxies;
                self.started = true;
                info!(services = ?self.proxies.keys().collect::<Vec<_>>(), "✅ Consumer started");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "❌ Failed to start consumer, rolling back");
                self.unsubscribe_all().await;
                Err(e)
            }
        }
    }

    async fn build_proxies(&mut self) -> Result<HashMap<String, Arc<ServiceProxy>>> {
        let mut proxies = HashMap::with_capacity(self.entries.len());
        for (name, entry) in &self.entries {
            entry.rpc_config.validate()?;

            let cache = InstanceCache::new();
            if let Some(registry_config) = &entry.registry_config {
                let registry = self.context.registry(registry_config).await?;
                // 先订阅再拉取，两次读取之间的变更由订阅回调送达
                registry
                    .subscribe(name, cache_listener(name.clone(), cache.clone()))
                    .await?;
                self.subscriptions.push((registry.clone(), name.clone()));

                let initial = registry.list_instances(name).await?;
                let count = initial.len();
                if cache.seed(initial) {
                    debug!(service = %name, instances = count, "Seeded instance cache");
                }
            } else {
                warn!(service = %name, "⚠️ No registry configured, service has no instances");
            }

            let proxy = ServiceProxy::new(
                entry.descriptor.clone(),
                entry.rpc_config.clone(),
                cache,
                self.context.serializers(),
            )?;
            proxies.insert(name.clone(), Arc::new(proxy));
        }
        Ok(proxies)
    }

    /// 获取服务代理
    pub fn get_service(&self, name: &str) -> Result<Arc<ServiceProxy>> {
        if !self.entries.contains_key(name) {
            return Err(RpcError::ServiceNotDeclared(name.to_string()));
        }
        if !self.started {
            return Err(RpcError::NotStarted);
        }
        self.proxies
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::ServiceNotDeclared(name.to_string()))
    }

    async fn unsubscribe_all(&mut self) {
        for (registry, name) in self.subscriptions.drain(..) {
            if let Err(e) = registry.unsubscribe(&name).await {
                warn!(service = %name, error = %e, "⚠️ Failed to unsubscribe");
            }
        }
    }

    /// 停止：尽力取消订阅并丢弃代理，可重复调用
    pub async fn stop(&mut self) {
        self.unsubscribe_all().await;
        self.proxies.clear();
        if self.started {
            self.started = false;
            info!("🛑 Consumer stopped");
        }
    }
}

fn cache_listener(service_name: String, cache: Arc<InstanceCache>) -> InstanceListener {
    Arc::new(move |instances: &[ServiceInstance]| {
        debug!(service = %service_name, instances = instances.len(), "🔄 Instance list changed");
        cache.replace(instances);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, Registry};
    use async_trait::async_trait;

    /// 读取实例列表后、返回之前恰好有新实例注册
    struct LateArrivalRegistry {
        inner: MemoryRegistry,
        late: ServiceInstance,
    }

    #[async_trait]
    impl Registry for LateArrivalRegistry {
        async fn register(&self, instance: ServiceInstance) -> Result<bool> {
            self.inner.register(instance).await
        }

        async fn unregister(&self, instance: &ServiceInstance) -> Result<bool> {
            self.inner.unregister(instance).await
        }

        async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
            let stale = self.inner.list_instances(service_name).await?;
            self.inner.register(self.late.clone()).await?;
            Ok(stale)
        }

        async fn get_instance(&self, service_name: &str) -> Result<Option<ServiceInstance>> {
            self.inner.get_instance(service_name).await
        }

        async fn subscribe(&self, service_name: &str, listener: InstanceListener) -> Result<()> {
            self.inner.subscribe(service_name, listener).await
        }

        async fn unsubscribe(&self, service_name: &str) -> Result<()> {
            self.inner.unsubscribe(service_name).await
        }

        async fn close(&self) -> Result<()> {
            self.inner.close().await
        }
    }

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new().method("reflect", 1)
    }

    #[tokio::test]
    async fn get_service_reports_lifecycle_errors() {
        let mut consumer = ConsumerBootstrap::new(RpcContext::new());
        assert_eq!(
            consumer.get_service("echo").unwrap_err(),
            RpcError::ServiceNotDeclared("echo".into())
        );

        consumer.add_service("echo", descriptor(), Some(RegistryConfig::memory()));
        assert_eq!(consumer.get_service("echo").unwrap_err(), RpcError::NotStarted);

        consumer.start().await.unwrap();
        assert!(consumer.get_service("echo").is_ok());

        consumer.stop().await;
        assert_eq!(consumer.get_service("echo").unwrap_err(), RpcError::NotStarted);
    }

    #[tokio::test]
    async fn cache_follows_registry_changes() {
        let context = RpcContext::new();
        let registry = context.registry(&RegistryConfig::memory()).await.unwrap();
        let first = ServiceInstance::new("echo", "127.0.0.1", 7001);
        registry.register(first.clone()).await.unwrap();

        let mut consumer = ConsumerBootstrap::new(context.clone());
        consumer.add_service("echo", descriptor(), Some(RegistryConfig::memory()));
        consumer.start().await.unwrap();
        let proxy = consumer.get_service("echo").unwrap();
        assert_eq!(proxy.instances().as_slice(), &[first.clone()]);

        let second = ServiceInstance::new("echo", "127.0.0.1", 7002);
        registry.register(second).await.unwrap();
        assert_eq!(proxy.instances().len(), 2);

        registry.unregister(&first).await.unwrap();
        let remaining = proxy.instances();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].port(), 7002);

        consumer.stop().await;
    }

    #[tokio::test]
    async fn service_without_registry_has_no_instances() {
        let mut consumer = ConsumerBootstrap::new(RpcContext::new());
        consumer.add_service("echo", descriptor(), None);
        consumer.start().await.unwrap();
        let err = consumer
            .get_service("echo")
            .unwrap()
            .invoke("reflect", vec!["x".into()])
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::NoAvailableInstance("echo".into()));
    }

    #[tokio::test]
    async fn invalid_config_fails_start() {
        let mut consumer = ConsumerBootstrap::new(RpcContext::new());
        consumer.add_service_with_config(
            "echo",
            descriptor(),
            Some(RegistryConfig::memory()),
            RpcConfig::new("ignored").with_timeout_ms(0),
        );
        assert!(consumer.start().await.is_err());
        assert!(!consumer.is_started());
        assert!(consumer.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn registration_racing_the_initial_list_is_not_lost() {
        let context = RpcContext::new();
        let config = RegistryConfig::redis("127.0.0.1:1").with_namespace("race");
        let registry = Arc::new(LateArrivalRegistry {
            inner: MemoryRegistry::new(),
            late: ServiceInstance::new("echo", "127.0.0.1", 7002),
        });
        registry
            .register(ServiceInstance::new("echo", "127.0.0.1", 7001))
            .await
            .unwrap();
        context
            .registry_factory()
            .insert(&config, registry.clone())
            .await;

        let mut consumer = ConsumerBootstrap::new(context);
        consumer.add_service("echo", descriptor(), Some(config));
        consumer.start().await.unwrap();

        let proxy = consumer.get_service("echo").unwrap();
        assert_eq!(registry.inner.list_instances("echo").await.unwrap().len(), 2);
        assert_eq!(proxy.instances().len(), 2);
        consumer.stop().await;
    }
}
