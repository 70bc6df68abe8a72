//! Flare RPC 错误处理模块
//!
//! 提供统一的错误类型、错误代码分类和错误转换

pub mod code;
pub mod rpc_error;

pub use code::{ErrorCategory, ErrorCode};
pub use rpc_error::{Result, RpcError};
