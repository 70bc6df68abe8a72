//! 内存注册中心
//!
//! 存活即在集合中，适用于单进程测试和开发环境

use super::instance::ServiceInstance;
use super::load_balancer::{LoadBalance, LoadBalancer};
use super::trait_def::{InstanceListener, Registry};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// 内存注册中心
pub struct MemoryRegistry {
    /// 按注册顺序保存，轮询策略依赖稳定的顺序
    services: RwLock<HashMap<String, Vec<ServiceInstance>>>,
    listeners: RwLock<HashMap<String, Vec<InstanceListener>>>,
    /// 每个服务一把锁，从修改到通知全程持有，保证快照按修改顺序送达
    service_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    balancer: LoadBalancer,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_load_balance(LoadBalance::default())
    }

    pub fn with_load_balance(strategy: LoadBalance) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            service_locks: Mutex::new(HashMap::new()),
            balancer: LoadBalancer::new(strategy),
        }
    }

    async fn service_lock(&self, service_name: &str) -> Arc<Mutex<()>> {
        self.service_locks
            .lock()
            .await
            .entry(service_name.to_string())
            .or_default()
            .clone()
    }

    /// 在数据锁外同步调用监听器
    async fn notify(&self, service_name: &str, instances: &[ServiceInstance]) {
        let listeners = self
            .listeners
            .read()
            .await
            .get(service_name)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener(instances);
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, instance: ServiceInstance) -> Result<bool> {
        let service_name = instance.service_name().to_string();
        let lock = self.service_lock(&service_name).await;
        let _ordered = lock.lock().await;
        let snapshot = {
            let mut services = self.services.write().await;
            let entries = services.entry(service_name.clone()).or_default();
            match entries.iter_mut().find(|existing| **existing == instance) {
                Some(existing) => *existing = instance.clone(),
                None => entries.push(instance.clone()),
            }
            entries.clone()
        };

        info!(
            service = %service_name,
            address = %instance.address(),
            "✅ Service instance registered"
        );
        self.notify(&service_name, &snapshot).await;
        Ok(true)
    }

    async fn unregister(&self, instance: &ServiceInstance) -> Result<bool> {
        let service_name = instance.service_name();
        let lock = self.service_lock(service_name).await;
        let _ordered = lock.lock().await;
        let (removed, snapshot) = {
            let mut services = self.services.write().await;
            match services.get_mut(service_name) {
                Some(entries) => {
                    let before = entries.len();
                    entries.retain(|existing| existing != instance);
                    let removed = entries.len() != before;
                    let snapshot = entries.clone();
                    if entries.is_empty() {
                        services.remove(service_name);
                    }
                    (removed, snapshot)
                }
                None => (false, Vec::new()),
            }
        };

        if removed {
            info!(
                service = %service_name,
                address = %instance.address(),
                "🗑️ Service instance unregistered"
            );
        } else {
            debug!(
                service = %service_name,
                address = %instance.address(),
                "Unregister of unknown instance ignored"
            );
        }
        self.notify(service_name, &snapshot).await;
        Ok(removed)
    }

    async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        Ok(self
            .services
            .read()
            .await
            .get(service_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_instance(&self, service_name: &str) -> Result<Option<ServiceInstance>> {
        let services = self.services.read().await;
        Ok(services
            .get(service_name)
            .and_then(|entries| self.balancer.select(entries))
            .cloned())
    }

    async fn subscribe(&self, service_name: &str, listener: InstanceListener) -> Result<()> {
        self.listeners
            .write()
            .await
            .entry(service_name.to_string())
            .or_default()
            .push(listener);
        debug!(service = %service_name, "👂 Subscribed to instance changes");
        Ok(())
    }

    async fn unsubscribe(&self, service_name: &str) -> Result<()> {
        self.listeners.write().await.remove(service_name);
        debug!(service = %service_name, "Unsubscribed from instance changes");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.listeners.write().await.clear();
        self.services.write().await.clear();
        Ok(())
    }
}
