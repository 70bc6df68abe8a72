//! 服务消费端
//!
//! 声明远程接口、订阅实例变更、通过代理完成负载均衡和重试调用。

pub mod bootstrap;
pub mod descriptor;
pub mod proxy;

pub use bootstrap::ConsumerBootstrap;
pub use descriptor::{Arity, ServiceDescriptor};
pub use proxy::ServiceProxy;
