//! Flare RPC
//!
//! 轻量 RPC 框架：自定义二进制帧协议、可插拔序列化、服务注册发现
//! （内存 / Redis）、Provider 并发服务端与带负载均衡和重试的 Consumer 代理。

pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod serializer;
pub mod telemetry;
pub mod utils;
pub mod value;

// Re-exports
pub use config::{Config, RegistryConfig, RegistryType, RpcConfig};
pub use consumer::{ConsumerBootstrap, ServiceDescriptor, ServiceProxy};
pub use context::RpcContext;
pub use error::{ErrorCategory, ErrorCode, Result, RpcError};
pub use protocol::{MessageCodec, ProtocolMessage, RpcRequest, RpcResponse};
pub use provider::{ProviderBootstrap, RpcService, ServiceError, ServiceRouter, arg};
pub use registry::{
    LoadBalance, LoadBalancer, MemoryRegistry, Registry, RemoteRegistry, ServiceInstance,
    SharedRegistry,
};
pub use retry::{ExponentialBackoffPolicy, FixedRetryPolicy, RetryPolicy};
pub use runtime::RuntimeConfig;
pub use serializer::{Serializer, SerializerRegistry, SerializerType};
pub use telemetry::{LogFormat, init_tracing};
pub use value::Value;
