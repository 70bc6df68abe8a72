//! 注册中心 Trait 定义

use super::instance::ServiceInstance;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// 实例列表变更监听器，参数为刷新后的完整实例列表
pub type InstanceListener = Arc<dyn Fn(&[ServiceInstance]) + Send + Sync>;

/// 注册中心 Trait
///
/// 同名服务的每一次 `register` / `unregister` 调用都会同步通知该服务的
/// 所有当前订阅者恰好一次。
#[async_trait]
pub trait Registry: Send + Sync {
    /// 注册实例；已存在时刷新元数据并返回成功
    async fn register(&self, instance: ServiceInstance) -> Result<bool>;

    /// 注销实例；实例不存在时返回 `false`
    async fn unregister(&self, instance: &ServiceInstance) -> Result<bool>;

    /// 列出存活实例
    async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>>;

    /// 按负载均衡策略选取一个实例
    async fn get_instance(&self, service_name: &str) -> Result<Option<ServiceInstance>>;

    /// 订阅实例变更
    async fn subscribe(&self, service_name: &str, listener: InstanceListener) -> Result<()>;

    /// 取消该服务名的所有订阅
    async fn unsubscribe(&self, service_name: &str) -> Result<()>;

    /// 关闭注册中心，停止后台任务
    async fn close(&self) -> Result<()>;
}

/// 注册中心共享句柄
pub type SharedRegistry = Arc<dyn Registry>;
