//! Provider 启动器
//!
//! 生命周期：
//! 1. `add_service` 记录服务条目（不做任何 I/O）
//! 2. `start` 注册全部实例（要么全部成功，要么全部回滚），然后为每个不同的
//!    `(host, port)` 绑定监听并启动 accept 任务
//! 3. `stop` 尽力注销、关闭监听、在限定时间内等待连接任务结束

use super::server::{Dispatcher, accept_loop, bind};
use super::service::RpcService;
use crate::config::RegistryConfig;
use crate::context::RpcContext;
use crate::error::{Result, RpcError};
use crate::protocol::PROTOCOL_VERSION;
use crate::registry::instance::{METADATA_SERIALIZER, METADATA_VERSION};
use crate::registry::{ServiceInstance, SharedRegistry};
use crate::runtime::{RuntimeConfig, wait_for_tasks_shutdown};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

struct ProviderEntry {
    name: String,
    service: Arc<dyn RpcService>,
    host: String,
    port: u16,
    registry_config: Option<RegistryConfig>,
    metadata: HashMap<String, String>,
}

/// Provider 启动器
pub struct ProviderBootstrap {
    context: RpcContext,
    config: RuntimeConfig,
    entries: Vec<ProviderEntry>,
    registered: Vec<(SharedRegistry, ServiceInstance)>,
    shutdown_tx: Option<watch::Sender<bool>>,
    accept_tasks: JoinSet<()>,
    local_addrs: Vec<SocketAddr>,
}

impl ProviderBootstrap {
    pub fn new(context: RpcContext) -> Self {
        Self::with_config(context, RuntimeConfig::default())
    }

    pub fn with_config(context: RpcContext, config: RuntimeConfig) -> Self {
        Self {
            context,
            config,
            entries: Vec::new(),
            registered: Vec::new(),
            shutdown_tx: None,
            accept_tasks: JoinSet::new(),
            local_addrs: Vec::new(),
        }
    }

    /// 添加服务，同名服务后添加的覆盖先添加的
    pub fn add_service(
        &mut self,
        name: impl Into<String>,
        service: impl RpcService,
        host: impl Into<String>,
        port: u16,
        registry_config: Option<RegistryConfig>,
        metadata: Option<HashMap<String, String>>,
    ) -> &mut Self {
        let entry = ProviderEntry {
            name: name.into(),
            service: Arc::new(service),
            host: host.into(),
            port,
            registry_config,
            metadata: metadata.unwrap_or_default(),
        };
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// 实际监听的地址
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// 启动：注册全部实例并开始监听
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            warn!("Provider already started");
            return Ok(());
        }

        info!(services = self.entries.len(), "🚀 Starting provider");
        if let Err(e) = self.register_all().await {
            self.rollback_registrations().await;
            return Err(e);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);
        if let Err(e) = self.bind_all(shutdown_rx).await {
            error!(error = %e, "❌ Failed to bind listeners, rolling back");
            self.stop().await;
            return Err(e);
        }

        info!(addresses = ?self.local_addrs, "✅ Provider started");
        Ok(())
    }

    async fn register_all(&mut self) -> Result<()> {
        let serializer = self.config.serializer_type;
        for entry in &self.entries {
            let Some(registry_config) = &entry.registry_config else {
                continue;
            };

            let instance = ServiceInstance::new(entry.name.clone(), entry.host.clone(), entry.port)
                .with_metadata_map(entry.metadata.clone())
                .with_metadata(METADATA_VERSION, PROTOCOL_VERSION.to_string())
                .with_metadata(METADATA_SERIALIZER, serializer.as_str());

            let registry = self.context.registry(registry_config).await?;
            match registry.register(instance.clone()).await {
                Ok(true) => self.registered.push((registry, instance)),
                Ok(false) => {
                    return Err(RpcError::registry(format!(
                        "registry refused instance {} of service '{}'",
                        instance.address(),
                        entry.name
                    )));
                }
                Err(e) => {
                    error!(
                        service = %entry.name,
                        address = %instance.address(),
                        error = %e,
                        "❌ Failed to register service"
                    );
                    // 写入可能已部分生效
                    if let Err(cleanup) = registry.unregister(&instance).await {
                        warn!(
                            service = %entry.name,
                            address = %instance.address(),
                            error = %cleanup,
                            "⚠️ Failed to clean up partially registered instance"
                        );
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn bind_all(&mut self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let mut groups: Vec<((String, u16), HashMap<String, Arc<dyn RpcService>>)> = Vec::new();
        for entry in &self.entries {
            let key = (entry.host.clone(), entry.port);
            let index = match groups.iter().position(|(k, _)| *k == key) {
                Some(index) => index,
                None => {
                    groups.push((key, HashMap::new()));
                    groups.len() - 1
                }
            };
            groups[index]
                .1
                .insert(entry.name.clone(), entry.service.clone());
        }

        for ((host, port), services) in groups {
            let listener = bind(&host, port).await?;
            let local_addr = listener.local_addr()?;
            let names: Vec<String> = services.keys().cloned().collect();
            let dispatcher = Arc::new(Dispatcher::new(services, self.context.serializers()));
            self.accept_tasks.spawn(accept_loop(
                listener,
                dispatcher,
                self.config.clone(),
                shutdown_rx.clone(),
            ));
            self.local_addrs.push(local_addr);
            info!(address = %local_addr, services = ?names, "👂 Listening");
        }
        Ok(())
    }

    async fn rollback_registrations(&mut self) {
        for (registry, instance) in self.registered.drain(..) {
            match registry.unregister(&instance).await {
                Ok(_) => info!(
                    service = %instance.service_name(),
                    address = %instance.address(),
                    "↩️ Registration rolled back"
                ),
                Err(e) => warn!(
                    service = %instance.service_name(),
                    address = %instance.address(),
                    error = %e,
                    "⚠️ Failed to unregister service"
                ),
            }
        }
    }

    /// 停止：可重复调用，部分启动或启动失败后调用同样安全
    pub async fn stop(&mut self) {
        self.rollback_registrations().await;

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if !self.accept_tasks.is_empty() {
            // accept 任务自身最多等待 shutdown_timeout，这里额外留一点余量
            let bound = self.config.shutdown_timeout + Duration::from_millis(500);
            wait_for_tasks_shutdown(bound, &mut self.accept_tasks).await;
        }
        if !self.local_addrs.is_empty() {
            info!(addresses = ?self.local_addrs, "🛑 Provider stopped");
            self.local_addrs.clear();
        }
    }
}

impl Drop for ProviderBootstrap {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        self.accept_tasks.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ServiceError, ServiceRouter};
    use crate::registry::{InstanceListener, MemoryRegistry, Registry};
    use crate::utils::free_local_port;
    use crate::value::Value;
    use async_trait::async_trait;

    /// 写入成功但随后报错的注册中心
    #[derive(Default)]
    struct HalfWriteRegistry {
        inner: MemoryRegistry,
    }

    #[async_trait]
    impl Registry for HalfWriteRegistry {
        async fn register(&self, instance: ServiceInstance) -> Result<bool> {
            self.inner.register(instance).await?;
            Err(RpcError::registry("read timeout"))
        }

        async fn unregister(&self, instance: &ServiceInstance) -> Result<bool> {
            self.inner.unregister(instance).await
        }

        async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
            self.inner.list_instances(service_name).await
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

    fn echo() -> ServiceRouter {
        ServiceRouter::new().method("ping", |_| async move {
            Ok::<Value, ServiceError>(Value::from("pong"))
        })
    }

    #[tokio::test]
    async fn start_registers_with_protocol_metadata() {
        let context = RpcContext::new();
        let port = free_local_port().await.unwrap();
        let mut provider = ProviderBootstrap::new(context.clone());
        let mut metadata = HashMap::new();
        metadata.insert("zone".to_string(), "east".to_string());
        provider.add_service(
            "echo",
            echo(),
            "127.0.0.1",
            port,
            Some(RegistryConfig::memory()),
            Some(metadata),
        );
        provider.start().await.unwrap();

        let registry = context.registry(&RegistryConfig::memory()).await.unwrap();
        let instances = registry.list_instances("echo").await.unwrap();
        assert_eq!(instances.len(), 1);
        let meta = instances[0].metadata();
        assert_eq!(meta.get("zone").map(String::as_str), Some("east"));
        assert_eq!(meta.get("version").map(String::as_str), Some("1"));
        assert_eq!(meta.get("serializer").map(String::as_str), Some("json"));

        provider.stop().await;
        assert!(registry.list_instances("echo").await.unwrap().is_empty());
        provider.stop().await;
    }

    #[tokio::test]
    async fn bind_failure_rolls_back_registration() {
        let context = RpcContext::new();
        let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let mut provider = ProviderBootstrap::new(context.clone());
        provider.add_service("echo", echo(), "127.0.0.1", port, Some(RegistryConfig::memory()), None);
        let err = provider.start().await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
        assert!(!provider.is_running());

        let registry = context.registry(&RegistryConfig::memory()).await.unwrap();
        assert!(registry.list_instances("echo").await.unwrap().is_empty());
        provider.stop().await;
    }

    #[tokio::test]
    async fn last_added_entry_wins() {
        let mut provider = ProviderBootstrap::new(RpcContext::new());
        provider.add_service("echo", echo(), "127.0.0.1", 1, None, None);
        provider.add_service("echo", echo(), "127.0.0.1", 2, None, None);
        assert_eq!(provider.entries.len(), 1);
        assert_eq!(provider.entries[0].port, 2);
    }

    #[tokio::test]
    async fn stop_before_start_is_safe() {
        let mut provider = ProviderBootstrap::new(RpcContext::new());
        provider.stop().await;
        assert!(!provider.is_running());
    }

    #[tokio::test]
    async fn failed_register_is_cleaned_up_even_if_partially_written() {
        let context = RpcContext::new();
        let config = RegistryConfig::redis("127.0.0.1:1").with_namespace("half");
        let registry = Arc::new(HalfWriteRegistry::default());
        context
            .registry_factory()
            .insert(&config, registry.clone())
            .await;

        let port = free_local_port().await.unwrap();
        let mut provider = ProviderBootstrap::new(context);
        provider.add_service("echo", echo(), "127.0.0.1", port, Some(config), None);
        let err = provider.start().await.unwrap_err();
        assert!(matches!(err, RpcError::Registry(_)));
        assert!(!provider.is_running());
        assert!(registry.list_instances("echo").await.unwrap().is_empty());
    }
}
