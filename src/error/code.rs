//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
///
/// 错误代码按类别分组，每个类别占用1000个代码范围：
/// - 1000-1999: 传输相关错误
/// - 2000-2999: 协议相关错误
/// - 3000-3999: 序列化相关错误
/// - 4000-4999: 远程调用返回的错误
/// - 5000-5999: 注册中心相关错误
/// - 6000-6999: 客户端调用相关错误
/// - 9000-9999: 配置错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 传输相关错误 (1000-1999)
    // ============================================================
    ConnectionFailed = 1000,
    ConnectionTimeout = 1001,
    ConnectionClosed = 1002,

    // ============================================================
    // 协议相关错误 (2000-2999)
    // ============================================================
    ProtocolError = 2000,
    BadMagic = 2001,
    ProtocolVersionMismatch = 2002,
    UnknownSerializer = 2003,
    MessageTooLarge = 2004,
    MessageFormatError = 2005,
    IncompleteFrame = 2006,

    // ============================================================
    // 序列化相关错误 (3000-3999)
    // ============================================================
    SerializationError = 3000,

    // ============================================================
    // 远程错误 (4000-4999)
    // ============================================================
    RemoteError = 4000,

    // ============================================================
    // 注册中心相关错误 (5000-5999)
    // ============================================================
    RegistryError = 5000,

    // ============================================================
    // 客户端调用相关错误 (6000-6999)
    // ============================================================
    ServiceNotDeclared = 6000,
    MethodNotDeclared = 6001,
    NoAvailableInstance = 6002,
    NotStarted = 6003,
    ArityMismatch = 6004,

    // ============================================================
    // 配置错误 (9000-9999)
    // ============================================================
    ConfigurationError = 9000,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 获取错误代码的字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::ConnectionTimeout => "CONNECTION_TIMEOUT",
            ErrorCode::ConnectionClosed => "CONNECTION_CLOSED",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::BadMagic => "BAD_MAGIC",
            ErrorCode::ProtocolVersionMismatch => "PROTOCOL_VERSION_MISMATCH",
            ErrorCode::UnknownSerializer => "UNKNOWN_SERIALIZER",
            ErrorCode::MessageTooLarge => "MESSAGE_TOO_LARGE",
            ErrorCode::MessageFormatError => "MESSAGE_FORMAT_ERROR",
            ErrorCode::IncompleteFrame => "INCOMPLETE_FRAME",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
            ErrorCode::RemoteError => "REMOTE_ERROR",
            ErrorCode::RegistryError => "REGISTRY_ERROR",
            ErrorCode::ServiceNotDeclared => "SERVICE_NOT_DECLARED",
            ErrorCode::MethodNotDeclared => "METHOD_NOT_DECLARED",
            ErrorCode::NoAvailableInstance => "NO_AVAILABLE_INSTANCE",
            ErrorCode::NotStarted => "NOT_STARTED",
            ErrorCode::ArityMismatch => "ARITY_MISMATCH",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            1000..=1999 => ErrorCategory::Transport,
            2000..=2999 => ErrorCategory::Protocol,
            3000..=3999 => ErrorCategory::Serialization,
            4000..=4999 => ErrorCategory::Remote,
            5000..=5999 => ErrorCategory::Registry,
            6000..=6999 => ErrorCategory::Invocation,
            _ => ErrorCategory::Configuration,
        }
    }

    /// 判断是否为可重试的错误
    ///
    /// 只有传输层错误会被重试，协议错误和远程错误都是确定性的
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Transport,
    Protocol,
    Serialization,
    Remote,
    Registry,
    Invocation,
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Transport => write!(f, "TRANSPORT"),
            ErrorCategory::Protocol => write!(f, "PROTOCOL"),
            ErrorCategory::Serialization => write!(f, "SERIALIZATION"),
            ErrorCategory::Remote => write!(f, "REMOTE"),
            ErrorCategory::Registry => write!(f, "REGISTRY"),
            ErrorCategory::Invocation => write!(f, "INVOCATION"),
            ErrorCategory::Configuration => write!(f, "CONFIGURATION"),
        }
    }
}
