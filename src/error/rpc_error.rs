//! Flare RPC 统一错误类型

use super::code::{ErrorCategory, ErrorCode};
use crate::protocol::CodecError;
use thiserror::Error;

/// Flare RPC 统一错误类型
///
/// 每个消费者调用要么返回解码后的结果，要么返回带类别的错误（见 [`RpcError::category`]）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// 连接、读写失败或连接被提前关闭
    #[error("transport error: {0}")]
    Transport(String),

    /// 套接字操作超时
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// 帧格式错误（魔数、版本、长度）
    #[error("protocol error: {0}")]
    Codec(CodecError),

    /// 其他协议违规（未知序列化器、消息类型不符、请求 ID 不匹配等）
    #[error("protocol error: {0}")]
    Protocol(String),

    /// 载荷编解码失败
    #[error("serialization error: {0}")]
    Serialization(String),

    /// 服务端返回的结构化错误响应
    #[error("remote error: {message}")]
    Remote { message: String },

    /// 注册中心错误
    #[error("registry error: {0}")]
    Registry(String),

    /// 配置错误
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("service not declared: {0}")]
    ServiceNotDeclared(String),

    #[error("method '{method}' is not declared on service '{service}'")]
    MethodNotDeclared { service: String, method: String },

    #[error("method '{method}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("no available instance for service '{0}'")]
    NoAvailableInstance(String),

    #[error("bootstrap has not been started")]
    NotStarted,
}

impl RpcError {
    /// 创建传输错误
    pub fn transport(reason: impl Into<String>) -> Self {
        RpcError::Transport(reason.into())
    }

    /// 创建超时错误
    pub fn timeout(reason: impl Into<String>) -> Self {
        RpcError::Timeout(reason.into())
    }

    /// 创建协议错误
    pub fn protocol(reason: impl Into<String>) -> Self {
        RpcError::Protocol(reason.into())
    }

    /// 创建序列化错误
    pub fn serialization(reason: impl Into<String>) -> Self {
        RpcError::Serialization(reason.into())
    }

    /// 创建远程错误
    pub fn remote(message: impl Into<String>) -> Self {
        RpcError::Remote {
            message: message.into(),
        }
    }

    /// 创建注册中心错误
    pub fn registry(reason: impl Into<String>) -> Self {
        RpcError::Registry(reason.into())
    }

    /// 创建配置错误
    pub fn configuration(reason: impl Into<String>) -> Self {
        RpcError::Configuration(reason.into())
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            RpcError::Transport(_) => ErrorCode::ConnectionFailed,
            RpcError::Timeout(_) => ErrorCode::ConnectionTimeout,
            RpcError::Codec(err) => err.code(),
            RpcError::Protocol(_) => ErrorCode::ProtocolError,
            RpcError::Serialization(_) => ErrorCode::SerializationError,
            RpcError::Remote { .. } => ErrorCode::RemoteError,
            RpcError::Registry(_) => ErrorCode::RegistryError,
            RpcError::Configuration(_) => ErrorCode::ConfigurationError,
            RpcError::ServiceNotDeclared(_) => ErrorCode::ServiceNotDeclared,
            RpcError::MethodNotDeclared { .. } => ErrorCode::MethodNotDeclared,
            RpcError::ArityMismatch { .. } => ErrorCode::ArityMismatch,
            RpcError::NoAvailableInstance(_) => ErrorCode::NoAvailableInstance,
            RpcError::NotStarted => ErrorCode::NotStarted,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(reason) => RpcError::Transport(reason),
            other => RpcError::Codec(other),
        }
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Transport(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for RpcError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        RpcError::Timeout(err.to_string())
    }
}

impl From<toml::de::Error> for RpcError {
    fn from(err: toml::de::Error) -> Self {
        RpcError::Configuration(format!("invalid TOML: {}", err))
    }
}

impl From<redis::RedisError> for RpcError {
    fn from(err: redis::RedisError) -> Self {
        RpcError::Registry(format!("redis: {}", err))
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_io_maps_to_transport() {
        let err: RpcError = CodecError::Io("connection reset".into()).into();
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert!(err.is_retryable());
    }

    #[test]
    fn bad_magic_is_fatal() {
        let err: RpcError = CodecError::BadMagic { found: 0xDEADBEEF }.into();
        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert_eq!(err.code(), ErrorCode::BadMagic);
        assert!(!err.is_retryable());
    }

    #[test]
    fn remote_error_carries_message() {
        let err = RpcError::remote("method not found: echo.missing");
        assert_eq!(err.category(), ErrorCategory::Remote);
        assert!(err.to_string().contains("method not found"));
    }
}
