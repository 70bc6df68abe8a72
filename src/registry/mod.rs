//! 服务注册发现模块
//!
//! 服务名到存活实例集合的目录，支持注册、查询、负载均衡选择和变更订阅。
//! 提供两种实现：
//! - [`MemoryRegistry`]：进程内存，存活即在集合中
//! - [`RemoteRegistry`]：远程存储（Redis），依赖 TTL 心跳判断存活

pub mod factory;
pub mod instance;
pub mod load_balancer;
pub mod memory;
pub mod remote;
pub mod store;
pub mod trait_def;

pub use factory::RegistryFactory;
pub use instance::ServiceInstance;
pub use load_balancer::{LoadBalance, LoadBalancer};
pub use memory::MemoryRegistry;
pub use remote::{RemoteRegistry, RemoteRegistryOptions};
pub use store::{RedisStore, RegistryStore};
pub use trait_def::{InstanceListener, Registry, SharedRegistry};
