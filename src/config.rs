//! 配置模块
//!
//! 注册中心配置与 RPC 调用配置，支持从 TOML 文件加载

use crate::error::{Result, RpcError};
use crate::registry::LoadBalance;
use crate::retry::{ExponentialBackoffPolicy, FixedRetryPolicy, RetryPolicy};
use crate::serializer::SerializerType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// 扩展项：心跳间隔（毫秒）
pub const EXT_HEARTBEAT_INTERVAL_MS: &str = "heartbeat_interval_ms";
/// 扩展项：订阅轮询间隔（毫秒）
pub const EXT_POLL_INTERVAL_MS: &str = "poll_interval_ms";
/// 扩展项：重试退避方式（fixed | exponential）
pub const EXT_RETRY_BACKOFF: &str = "retry_backoff";
/// 扩展项：重试基础延迟（毫秒）
pub const EXT_RETRY_DELAY_MS: &str = "retry_delay_ms";

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_RETRY_DELAY_MS: u64 = 100;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// 注册中心类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryType {
    /// 进程内存
    #[default]
    Memory,
    /// Redis 远程存储
    #[serde(alias = "remote")]
    Redis,
}

impl fmt::Display for RegistryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryType::Memory => write!(f, "memory"),
            RegistryType::Redis => write!(f, "redis"),
        }
    }
}

/// 注册中心配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub registry_type: RegistryType,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default)]
    pub extensions: HashMap<String, String>,
}

fn default_namespace() -> String {
    "flare".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_session_timeout_ms() -> u64 {
    30000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_type: RegistryType::Memory,
            address: String::new(),
            username: None,
            password: None,
            namespace: default_namespace(),
            connect_timeout_ms: default_connect_timeout_ms(),
            session_timeout_ms: default_session_timeout_ms(),
            extensions: HashMap::new(),
        }
    }
}

impl RegistryConfig {
    /// 内存注册中心
    pub fn memory() -> Self {
        Self::default()
    }

    /// Redis 注册中心，`address` 形如 `127.0.0.1:6379` 或 `redis://host:port/db`
    pub fn redis(address: impl Into<String>) -> Self {
        Self {
            registry_type: RegistryType::Redis,
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_credentials(mut self, username: Option<String>, password: impl Into<String>) -> Self {
        self.username = username;
        self.password = Some(password.into());
        self
    }

    pub fn with_session_timeout_ms(mut self, ms: u64) -> Self {
        self.session_timeout_ms = ms;
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// 心跳 TTL
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 心跳间隔，默认 TTL 的 1/3，始终严格小于 TTL
    pub fn heartbeat_interval(&self) -> Result<Duration> {
        let ttl = self.session_timeout_ms.max(2);
        let interval = extension_u64(&self.extensions, EXT_HEARTBEAT_INTERVAL_MS)?
            .unwrap_or(ttl / 3)
            .clamp(1, ttl - 1);
        Ok(Duration::from_millis(interval))
    }

    /// 订阅轮询间隔
    pub fn poll_interval(&self) -> Result<Duration> {
        let interval = extension_u64(&self.extensions, EXT_POLL_INTERVAL_MS)?
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .max(1);
        Ok(Duration::from_millis(interval))
    }

    /// 带凭据的连接 URL
    pub fn connection_url(&self) -> String {
        let (scheme, rest) = match self.address.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("redis", self.address.as_str()),
        };
        match (&self.username, &self.password) {
            (_, None) => format!("{}://{}", scheme, rest),
            (Some(user), Some(pass)) => format!("{}://{}:{}@{}", scheme, user, pass, rest),
            (None, Some(pass)) => format!("{}://:{}@{}", scheme, pass, rest),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.registry_type == RegistryType::Redis && self.address.is_empty() {
            return Err(RpcError::configuration("redis registry requires an address"));
        }
        if self.session_timeout_ms < 2 {
            return Err(RpcError::configuration(
                "session_timeout_ms must be at least 2",
            ));
        }
        self.heartbeat_interval()?;
        self.poll_interval()?;
        Ok(())
    }
}

/// RPC 调用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    pub service_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(default)]
    pub serializer_type: SerializerType,
    #[serde(default)]
    pub load_balance: LoadBalance,
    #[serde(default)]
    pub extensions: HashMap<String, String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_group() -> String {
    "default".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_retries() -> usize {
    2
}

impl RpcConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            version: default_version(),
            group: default_group(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            serializer_type: SerializerType::default(),
            load_balance: LoadBalance::default(),
            extensions: HashMap::new(),
        }
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_serializer(mut self, serializer_type: SerializerType) -> Self {
        self.serializer_type = serializer_type;
        self
    }

    pub fn with_load_balance(mut self, load_balance: LoadBalance) -> Self {
        self.load_balance = load_balance;
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// 单次调用超时
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 根据 `retries` 和扩展项构建重试策略
    pub fn retry_policy(&self) -> Result<Arc<dyn RetryPolicy>> {
        let delay = Duration::from_millis(
            extension_u64(&self.extensions, EXT_RETRY_DELAY_MS)?.unwrap_or(DEFAULT_RETRY_DELAY_MS),
        );
        let backoff = self
            .extensions
            .get(EXT_RETRY_BACKOFF)
            .map(|s| s.trim().to_ascii_lowercase());
        match backoff.as_deref() {
            None | Some("fixed") => Ok(Arc::new(FixedRetryPolicy::new(self.retries, delay))),
            Some("exponential") => Ok(Arc::new(ExponentialBackoffPolicy::new(
                self.retries,
                delay,
                MAX_RETRY_DELAY.max(delay),
            ))),
            Some(other) => Err(RpcError::configuration(format!(
                "unknown retry_backoff '{}', expected fixed or exponential",
                other
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(RpcError::configuration("service_name must not be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(RpcError::configuration("timeout_ms must be positive"));
        }
        self.retry_policy()?;
        Ok(())
    }
}

/// 配置文件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
    #[serde(default)]
    pub rpc: Vec<RpcConfig>,
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RpcError::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if let Some(registry) = &config.registry {
            registry.validate()?;
        }
        for rpc in &config.rpc {
            rpc.validate()?;
        }
        Ok(config)
    }

    /// 按服务名查找 RPC 配置
    pub fn rpc_config(&self, service_name: &str) -> Option<&RpcConfig> {
        self.rpc.iter().find(|c| c.service_name == service_name)
    }
}

fn extension_u64(extensions: &HashMap<String, String>, key: &str) -> Result<Option<u64>> {
    extensions
        .get(key)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|_| {
                RpcError::configuration(format!("extension '{}' must be an integer, got '{}'", key, raw))
            })
        })
        .transpose()
}
