//! 远程存储注册中心
//!
//! 存活依赖心跳：后台任务以小于 TTL 的间隔续期本进程注册的所有实例，
//! 续期失败即等同于实例消失。存储没有推送能力，订阅通过轮询 + 快照比对实现。

use super::instance::ServiceInstance;
use super::load_balancer::{LoadBalance, LoadBalancer};
use super::store::RegistryStore;
use super::trait_def::{InstanceListener, Registry};
use crate::config::RegistryConfig;
use crate::error::{Result, RpcError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 远程注册中心时间参数
///
/// 只能通过 [`RemoteRegistryOptions::new`] 或 `from_config` 构造，
/// 保证心跳间隔非零且严格小于 TTL、轮询间隔非零。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteRegistryOptions {
    ttl: Duration,
    heartbeat_interval: Duration,
    poll_interval: Duration,
}

impl RemoteRegistryOptions {
    pub fn new(ttl: Duration, heartbeat_interval: Duration, poll_interval: Duration) -> Result<Self> {
        if heartbeat_interval.is_zero() || heartbeat_interval >= ttl {
            return Err(RpcError::configuration(format!(
                "heartbeat interval {}ms must be positive and shorter than ttl {}ms",
                heartbeat_interval.as_millis(),
                ttl.as_millis()
            )));
        }
        if poll_interval.is_zero() {
            return Err(RpcError::configuration("poll interval must be positive"));
        }
        Ok(Self {
            ttl,
            heartbeat_interval,
            poll_interval,
        })
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            config.session_timeout(),
            config.heartbeat_interval()?,
            config.poll_interval()?,
        )
    }

    /// 心跳标记 TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

struct Subscription {
    listeners: Vec<InstanceListener>,
    snapshot: HashSet<ServiceInstance>,
    poller: JoinHandle<()>,
}

struct Inner<S> {
    store: S,
    options: RemoteRegistryOptions,
    balancer: LoadBalancer,
    /// 本进程注册的实例，由心跳任务续期
    owned: RwLock<HashSet<ServiceInstance>>,
    /// 订阅表；轮询和本地通知都在持锁期间刷新快照，避免重复通知
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

struct Heartbeat {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// 远程存储注册中心
pub struct RemoteRegistry<S: RegistryStore> {
    inner: Arc<Inner<S>>,
    heartbeat: std::sync::Mutex<Option<Heartbeat>>,
}

impl<S: RegistryStore> RemoteRegistry<S> {
    pub fn new(store: S, options: RemoteRegistryOptions) -> Self {
        Self::with_load_balance(store, options, LoadBalance::default())
    }

    pub fn with_load_balance(
        store: S,
        options: RemoteRegistryOptions,
        strategy: LoadBalance,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                options,
                balancer: LoadBalancer::new(strategy),
                owned: RwLock::new(HashSet::new()),
                subscriptions: Mutex::new(HashMap::new()),
            }),
            heartbeat: std::sync::Mutex::new(None),
        }
    }

    pub fn options(&self) -> RemoteRegistryOptions {
        self.inner.options
    }

    /// 停止心跳任务。之后本进程注册的实例会在 TTL 到期后消失
    pub fn stop_heartbeat(&self) {
        let heartbeat = match self.heartbeat.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(heartbeat) = heartbeat {
            let _ = heartbeat.shutdown_tx.try_send(());
            heartbeat.handle.abort();
            info!("🛑 Heartbeat task stopped");
        }
    }

    fn ensure_heartbeat(&self) {
        let mut guard = match self.heartbeat.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if (*guard).as_ref().is_some_and(|hb| !hb.handle.is_finished()) {
            return;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let inner = self.inner.clone();
        let handle = tokio::spawn(heartbeat_loop(inner, shutdown_rx));
        *guard = Some(Heartbeat {
            shutdown_tx,
            handle,
        });
    }
}

async fn heartbeat_loop<S: RegistryStore>(inner: Arc<Inner<S>>, mut shutdown_rx: mpsc::Receiver<()>) {
    let mut interval_timer = tokio::time::interval(inner.options.heartbeat_interval);
    // 注册时刚写过标记，跳过立即触发的第一次 tick
    interval_timer.tick().await;

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                let owned: Vec<ServiceInstance> = inner.owned.read().await.iter().cloned().collect();
                for instance in &owned {
                    match inner.store.refresh(instance, inner.options.ttl).await {
                        Ok(()) => {
                            debug!(
                                service = %instance.service_name(),
                                address = %instance.address(),
                                "💓 Heartbeat sent"
                            );
                        }
                        Err(e) => {
                            error!(
                                service = %instance.service_name(),
                                address = %instance.address(),
                                error = %e,
                                "❌ Failed to send heartbeat"
                            );
                        }
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }
}

async fn poll_loop<S: RegistryStore>(inner: Arc<Inner<S>>, service_name: String) {
    let mut interval_timer = tokio::time::interval(inner.options.poll_interval);
    interval_timer.tick().await;

    loop {
        interval_timer.tick().await;
        match inner.refresh_snapshot(&service_name).await {
            Ok(Some(count)) => {
                debug!(service = %service_name, count, "🔄 Instance set changed");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    service = %service_name,
                    error = %e,
                    "⚠️ Failed to poll registry"
                );
            }
        }
    }
}

impl<S: RegistryStore> Inner<S> {
    async fn live_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let entries = self.store.entries(service_name).await?;
        let alive = self.store.alive(&entries).await?;
        Ok(entries
            .into_iter()
            .zip(alive)
            .filter_map(|(instance, alive)| alive.then_some(instance))
            .collect())
    }

    /// 重新列出实例并与快照比对，有变化时通知监听器并返回实例数
    ///
    /// 监听器在订阅锁内调用，同一服务的通知严格按快照顺序送达
    async fn refresh_snapshot(&self, service_name: &str) -> Result<Option<usize>> {
        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.contains_key(service_name) {
            return Ok(None);
        }
        let instances = self.live_instances(service_name).await?;
        let Some(subscription) = subscriptions.get_mut(service_name) else {
            return Ok(None);
        };
        let current: HashSet<ServiceInstance> = instances.iter().cloned().collect();
        if current == subscription.snapshot {
            return Ok(None);
        }
        subscription.snapshot = current;
        for listener in &subscription.listeners {
            listener(&instances);
        }
        Ok(Some(instances.len()))
    }

    /// 本地注册/注销后的同步通知：无论是否变化都通知一次，并刷新快照
    async fn notify(&self, service_name: &str) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.contains_key(service_name) {
            return Ok(());
        }
        let instances = self.live_instances(service_name).await?;
        if let Some(subscription) = subscriptions.get_mut(service_name) {
            subscription.snapshot = instances.iter().cloned().collect();
            for listener in &subscription.listeners {
                listener(&instances);
            }
        }
        Ok(())
    }

    /// 写入后的通知失败不影响注册结果，轮询会在下一轮补发变更
    async fn notify_after_write(&self, service_name: &str) {
        if let Err(e) = self.notify(service_name).await {
            warn!(
                service = %service_name,
                error = %e,
                "⚠️ Failed to notify subscribers, poller will catch up"
            );
        }
    }
}

#[async_trait]
impl<S: RegistryStore> Registry for RemoteRegistry<S> {
    async fn register(&self, instance: ServiceInstance) -> Result<bool> {
        self.inner.store.put(&instance, self.inner.options.ttl).await?;
        {
            let mut owned = self.inner.owned.write().await;
            owned.replace(instance.clone());
        }
        self.ensure_heartbeat();

        info!(
            service = %instance.service_name(),
            address = %instance.address(),
            ttl_ms = self.inner.options.ttl.as_millis() as u64,
            "✅ Service instance registered"
        );
        self.inner.notify_after_write(instance.service_name()).await;
        Ok(true)
    }

    async fn unregister(&self, instance: &ServiceInstance) -> Result<bool> {
        self.inner.owned.write().await.remove(instance);
        let removed = self.inner.store.remove(instance).await?;
        if removed {
            info!(
                service = %instance.service_name(),
                address = %instance.address(),
                "🗑️ Service instance unregistered"
            );
        }
        self.inner.notify_after_write(instance.service_name()).await;
        Ok(removed)
    }

    async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        self.inner.live_instances(service_name).await
    }

    async fn get_instance(&self, service_name: &str) -> Result<Option<ServiceInstance>> {
        let instances = self.inner.live_instances(service_name).await?;
        Ok(self.inner.balancer.select(&instances).cloned())
    }

    async fn subscribe(&self, service_name: &str, listener: InstanceListener) -> Result<()> {
        let mut subscriptions = self.inner.subscriptions.lock().await;
        if let Some(subscription) = subscriptions.get_mut(service_name) {
            subscription.listeners.push(listener);
            return Ok(());
        }

        let snapshot = self
            .inner
            .live_instances(service_name)
            .await?
            .into_iter()
            .collect();
        let poller = tokio::spawn(poll_loop(self.inner.clone(), service_name.to_string()));
        subscriptions.insert(
            service_name.to_string(),
            Subscription {
                listeners: vec![listener],
                snapshot,
                poller,
            },
        );
        debug!(
            service = %service_name,
            poll_interval_ms = self.inner.options.poll_interval.as_millis() as u64,
            "👂 Subscribed to instance changes"
        );
        Ok(())
    }

    async fn unsubscribe(&self, service_name: &str) -> Result<()> {
        if let Some(subscription) = self.inner.subscriptions.lock().await.remove(service_name) {
            subscription.poller.abort();
            debug!(service = %service_name, "Unsubscribed from instance changes");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.stop_heartbeat();
        let mut subscriptions = self.inner.subscriptions.lock().await;
        for (_, subscription) in subscriptions.drain() {
            subscription.poller.abort();
        }
        Ok(())
    }
}

impl<S: RegistryStore> Drop for RemoteRegistry<S> {
    fn drop(&mut self) {
        self.stop_heartbeat();
        if let Ok(mut subscriptions) = self.inner.subscriptions.try_lock() {
            for (_, subscription) in subscriptions.drain() {
                subscription.poller.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    /// 带 TTL 语义的进程内存储
    #[derive(Default)]
    struct TtlStore {
        entries: std::sync::Mutex<HashMap<String, Vec<ServiceInstance>>>,
        markers: std::sync::Mutex<HashMap<ServiceInstance, Instant>>,
        /// 置位后目录读取失败，模拟存储读超时
        fail_reads: AtomicBool,
    }

    #[async_trait]
    impl RegistryStore for TtlStore {
        async fn put(&self, instance: &ServiceInstance, ttl: Duration) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            let list = entries.entry(instance.service_name().to_string()).or_default();
            list.retain(|i| i != instance);
            list.push(instance.clone());
            self.markers
                .lock()
                .unwrap()
                .insert(instance.clone(), Instant::now() + ttl);
            Ok(())
        }

        async fn remove(&self, instance: &ServiceInstance) -> Result<bool> {
            self.markers.lock().unwrap().remove(instance);
            let mut entries = self.entries.lock().unwrap();
            let list = entries.entry(instance.service_name().to_string()).or_default();
            let before = list.len();
            list.retain(|i| i != instance);
            Ok(list.len() != before)
        }

        async fn entries(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(RpcError::registry("read timeout"));
            }
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(service_name)
                .cloned()
                .unwrap_or_default())
        }

        async fn alive(&self, instances: &[ServiceInstance]) -> Result<Vec<bool>> {
            let markers = self.markers.lock().unwrap();
            let now = Instant::now();
            Ok(instances
                .iter()
                .map(|i| markers.get(i).is_some_and(|deadline| *deadline > now))
                .collect())
        }

        async fn refresh(&self, instance: &ServiceInstance, ttl: Duration) -> Result<()> {
            self.markers
                .lock()
                .unwrap()
                .insert(instance.clone(), Instant::now() + ttl);
            Ok(())
        }
    }

    fn options(ttl_ms: u64, heartbeat_ms: u64, poll_ms: u64) -> RemoteRegistryOptions {
        RemoteRegistryOptions::new(
            Duration::from_millis(ttl_ms),
            Duration::from_millis(heartbeat_ms),
            Duration::from_millis(poll_ms),
        )
        .unwrap()
    }

    fn echo(port: u16) -> ServiceInstance {
        ServiceInstance::new("echo", "127.0.0.1", port)
    }

    #[tokio::test]
    async fn heartbeat_keeps_instance_alive_past_ttl() {
        let registry = RemoteRegistry::new(TtlStore::default(), options(300, 100, 1000));
        registry.register(echo(9000)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(registry.list_instances("echo").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn instance_vanishes_after_heartbeat_stops() {
        let registry = RemoteRegistry::new(TtlStore::default(), options(300, 100, 1000));
        registry.register(echo(9000)).await.unwrap();
        registry.register(echo(9001)).await.unwrap();
        assert_eq!(registry.list_instances("echo").await.unwrap().len(), 2);

        registry.stop_heartbeat();
        tokio::time::sleep(Duration::from_millis(600)).await;

        // 目录项仍在，但心跳标记已过期
        assert_eq!(registry.inner.store.entries("echo").await.unwrap().len(), 2);
        assert!(registry.list_instances("echo").await.unwrap().is_empty());
        assert!(registry.get_instance("echo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_changes_notify_once_despite_polling() {
        let registry = RemoteRegistry::new(TtlStore::default(), options(5000, 1000, 20));
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        registry
            .subscribe(
                "echo",
                Arc::new(move |_: &[ServiceInstance]| {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        registry.register(echo(9000)).await.unwrap();
        registry.register(echo(9001)).await.unwrap();
        registry.unregister(&echo(9000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poller_reports_external_changes_only_on_change() {
        let registry = RemoteRegistry::new(TtlStore::default(), options(5000, 1000, 20));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        registry
            .subscribe(
                "echo",
                Arc::new(move |instances: &[ServiceInstance]| {
                    s.lock().unwrap().push(instances.len());
                }),
            )
            .await
            .unwrap();

        // 其他进程直接写入存储
        registry
            .inner
            .store
            .put(&echo(9100), Duration::from_secs(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        registry.inner.store.remove(&echo(9100)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 0]);

        registry.unsubscribe("echo").await.unwrap();
        registry
            .inner
            .store
            .put(&echo(9101), Duration::from_secs(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 0]);
    }

    #[tokio::test]
    async fn unregister_of_absent_instance_returns_false() {
        let registry = RemoteRegistry::new(TtlStore::default(), options(5000, 1000, 1000));
        assert!(!registry.unregister(&echo(9000)).await.unwrap());
        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn register_succeeds_when_only_notification_read_fails() {
        let registry = RemoteRegistry::new(TtlStore::default(), options(5000, 1000, 20));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        registry
            .subscribe(
                "echo",
                Arc::new(move |instances: &[ServiceInstance]| {
                    s.lock().unwrap().push(instances.len());
                }),
            )
            .await
            .unwrap();

        registry.inner.store.fail_reads.store(true, Ordering::SeqCst);
        assert!(registry.register(echo(9000)).await.unwrap());
        assert!(registry.inner.owned.read().await.contains(&echo(9000)));

        // 读取恢复后由轮询补发变更
        registry.inner.store.fail_reads.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        assert!(registry.unregister(&echo(9000)).await.unwrap());
        assert!(registry.inner.store.entries("echo").await.unwrap().is_empty());
        assert!(registry.inner.owned.read().await.is_empty());
        registry.close().await.unwrap();
    }

    #[test]
    fn options_reject_unsafe_intervals() {
        let ms = Duration::from_millis;
        assert!(RemoteRegistryOptions::new(ms(300), ms(300), ms(100)).is_err());
        assert!(RemoteRegistryOptions::new(ms(300), ms(500), ms(100)).is_err());
        assert!(RemoteRegistryOptions::new(ms(300), Duration::ZERO, ms(100)).is_err());
        assert!(RemoteRegistryOptions::new(ms(300), ms(100), Duration::ZERO).is_err());

        let options = RemoteRegistryOptions::new(ms(300), ms(100), ms(50)).unwrap();
        assert_eq!(options.ttl(), ms(300));
        assert_eq!(options.heartbeat_interval(), ms(100));
        assert_eq!(options.poll_interval(), ms(50));
    }
}
