//! 远程注册中心存储
//!
//! 每个实例在存储中有两条记录：
//! - 目录项：`{namespace}:service:{name}` 哈希表中字段 `host:port`，值为实例 JSON
//! - 心跳标记：`{namespace}:heartbeat:{name}:{host}:{port}`，带 TTL 独立过期
//!
//! 只有心跳标记仍然存活的目录项才算存活实例。

use super::instance::ServiceInstance;
use crate::config::RegistryConfig;
use crate::error::{Result, RpcError};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// 远程存储抽象
#[async_trait]
pub trait RegistryStore: Send + Sync + 'static {
    /// 写入目录项与心跳标记（同一批次）
    async fn put(&self, instance: &ServiceInstance, ttl: Duration) -> Result<()>;

    /// 删除目录项与心跳标记，返回目录项是否存在
    async fn remove(&self, instance: &ServiceInstance) -> Result<bool>;

    /// 读取某服务的全部目录项（不论存活）
    async fn entries(&self, service_name: &str) -> Result<Vec<ServiceInstance>>;

    /// 按顺序检查心跳标记是否存活
    async fn alive(&self, instances: &[ServiceInstance]) -> Result<Vec<bool>>;

    /// 续期心跳标记
    async fn refresh(&self, instance: &ServiceInstance, ttl: Duration) -> Result<()>;
}

/// Redis 存储
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisStore {
    /// 按配置连接 Redis，连接过程受 `connect_timeout_ms` 约束
    pub async fn connect(config: &RegistryConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection_url())?;
        let conn = tokio::time::timeout(config.connect_timeout(), ConnectionManager::new(client))
            .await
            .map_err(|_| {
                RpcError::registry(format!(
                    "timed out connecting to redis at {} after {}ms",
                    config.address, config.connect_timeout_ms
                ))
            })??;

        info!(
            address = %config.address,
            namespace = %config.namespace,
            "✅ Connected to redis registry store"
        );
        Ok(Self {
            conn,
            namespace: config.namespace.clone(),
        })
    }

    fn service_key(&self, service_name: &str) -> String {
        format!("{}:service:{}", self.namespace, service_name)
    }

    fn heartbeat_key(&self, instance: &ServiceInstance) -> String {
        format!(
            "{}:heartbeat:{}:{}:{}",
            self.namespace,
            instance.service_name(),
            instance.host(),
            instance.port()
        )
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl RegistryStore for RedisStore {
    async fn put(&self, instance: &ServiceInstance, ttl: Duration) -> Result<()> {
        let value = serde_json::to_string(instance)
            .map_err(|e| RpcError::registry(format!("failed to encode instance: {}", e)))?;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(self.service_key(instance.service_name()), instance.address(), value)
            .ignore()
            .pset_ex(self.heartbeat_key(instance), 1, ttl_millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, instance: &ServiceInstance) -> Result<bool> {
        let mut conn = self.conn.clone();
        let (removed, _): (i64, i64) = redis::pipe()
            .atomic()
            .hdel(self.service_key(instance.service_name()), instance.address())
            .del(self.heartbeat_key(instance))
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn entries(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(self.service_key(service_name)).await?;

        let mut instances: Vec<ServiceInstance> = raw
            .into_iter()
            .filter_map(|(field, value)| match serde_json::from_str(&value) {
                Ok(instance) => Some(instance),
                Err(e) => {
                    warn!(
                        service = %service_name,
                        field = %field,
                        error = %e,
                        "⚠️ Skipping malformed registry entry"
                    );
                    None
                }
            })
            .collect();
        // 哈希表无序，按地址排序保证轮询稳定
        instances.sort_by(|a, b| a.host().cmp(b.host()).then(a.port().cmp(&b.port())));
        Ok(instances)
    }

    async fn alive(&self, instances: &[ServiceInstance]) -> Result<Vec<bool>> {
        if instances.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for instance in instances {
            pipe.exists(self.heartbeat_key(instance));
        }
        let mut conn = self.conn.clone();
        let alive: Vec<bool> = pipe.query_async(&mut conn).await?;
        Ok(alive)
    }

    async fn refresh(&self, instance: &ServiceInstance, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .pset_ex(self.heartbeat_key(instance), 1, ttl_millis(ttl))
            .await?;
        Ok(())
    }
}
