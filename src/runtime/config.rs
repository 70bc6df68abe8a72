//! 运行时配置模块

use crate::serializer::SerializerType;
use std::time::Duration;

/// Provider 运行时配置
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// 关闭超时时间（默认 5 秒），超时后中止仍在运行的连接任务
    pub shutdown_timeout: Duration,
    /// 单次读写超时（默认 5 秒）
    pub io_timeout: Duration,
    /// 连接空闲超时（默认 60 秒），期间没有新请求则关闭连接
    pub idle_timeout: Duration,
    /// 注册到元数据中的序列化器
    pub serializer_type: SerializerType,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            serializer_type: SerializerType::Json,
        }
    }
}

impl RuntimeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置关闭超时时间
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// 设置读写超时时间
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// 设置空闲超时时间
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_serializer(mut self, serializer_type: SerializerType) -> Self {
        self.serializer_type = serializer_type;
        self
    }
}
