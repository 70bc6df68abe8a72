//! Provider 模块
//!
//! 持有服务实现、注册实例，并运行并发的 accept / 分发服务端

pub mod bootstrap;
pub(crate) mod server;
pub mod service;

pub use bootstrap::ProviderBootstrap;
pub use service::{RpcService, ServiceError, ServiceRouter, arg};
