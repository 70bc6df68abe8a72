//! Redis 注册中心集成测试
//!
//! 这些测试需要运行中的 Redis 实例。
//! 默认情况下，测试会被忽略，需要使用 `cargo test --test redis_registry_test -- --ignored` 运行。
//!
//! 启动 Redis：
//! ```bash
//! docker run -d --name redis-test -p 6379:6379 redis:7
//! ```

use flare_rpc::registry::{RedisStore, RegistryStore, RemoteRegistry, RemoteRegistryOptions};
use flare_rpc::{Registry, RegistryConfig, ServiceInstance};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;

/// Redis 地址，可以通过环境变量 REDIS_ADDRESS 覆盖
fn redis_address() -> String {
    std::env::var("REDIS_ADDRESS").unwrap_or_else(|_| "127.0.0.1:6379".to_string())
}

/// 每个测试使用独立命名空间，避免相互干扰
fn test_config(test: &str) -> RegistryConfig {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    RegistryConfig::redis(redis_address())
        .with_namespace(format!("flare-test-{}-{}", test, nanos))
        .with_session_timeout_ms(1500)
        .with_extension("poll_interval_ms", "200")
}

async fn registry(config: &RegistryConfig) -> RemoteRegistry<RedisStore> {
    let store = RedisStore::connect(config).await.expect("connect to redis");
    RemoteRegistry::new(store, RemoteRegistryOptions::from_config(config).unwrap())
}

#[tokio::test]
#[ignore]
async fn register_list_unregister() {
    let config = test_config("crud");
    let registry = registry(&config).await;
    let instance = ServiceInstance::new("echo", "127.0.0.1", 9100).with_metadata("weight", "5");

    assert!(registry.register(instance.clone()).await.unwrap());
    let listed = registry.list_instances("echo").await.unwrap();
    assert_eq!(listed, vec![instance.clone()]);
    assert_eq!(listed[0].weight(), 5);

    assert!(registry.unregister(&instance).await.unwrap());
    assert!(!registry.unregister(&instance).await.unwrap());
    assert!(registry.list_instances("echo").await.unwrap().is_empty());
    registry.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn heartbeat_keeps_instance_alive_past_ttl() {
    let config = test_config("heartbeat");
    let registry = registry(&config).await;
    let instance = ServiceInstance::new("echo", "127.0.0.1", 9101);
    registry.register(instance.clone()).await.unwrap();

    sleep(Duration::from_millis(3000)).await;
    assert_eq!(registry.list_instances("echo").await.unwrap().len(), 1);

    registry.stop_heartbeat();
    sleep(Duration::from_millis(2500)).await;
    assert!(registry.list_instances("echo").await.unwrap().is_empty());
    registry.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn subscriber_sees_changes_from_another_process() {
    let config = test_config("subscribe");
    let watcher = registry(&config).await;
    let publisher = RedisStore::connect(&config).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let last_len = Arc::new(AtomicUsize::new(usize::MAX));
    let (c, l) = (calls.clone(), last_len.clone());
    watcher
        .subscribe(
            "echo",
            Arc::new(move |instances: &[ServiceInstance]| {
                c.fetch_add(1, Ordering::SeqCst);
                l.store(instances.len(), Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();

    // 直接写存储，模拟另一个进程注册
    let instance = ServiceInstance::new("echo", "127.0.0.1", 9102);
    publisher.put(&instance, Duration::from_secs(30)).await.unwrap();
    sleep(Duration::from_millis(800)).await;
    assert_eq!(last_len.load(Ordering::SeqCst), 1);

    publisher.remove(&instance).await.unwrap();
    sleep(Duration::from_millis(800)).await;
    assert_eq!(last_len.load(Ordering::SeqCst), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    watcher.unsubscribe("echo").await.unwrap();
    watcher.close().await.unwrap();
}
