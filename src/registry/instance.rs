//! 服务实例

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// 元数据键：负载均衡权重
pub const METADATA_WEIGHT: &str = "weight";
/// 元数据键：协议版本
pub const METADATA_VERSION: &str = "version";
/// 元数据键：序列化器
pub const METADATA_SERIALIZER: &str = "serializer";

/// 默认权重
pub const DEFAULT_WEIGHT: u32 = 100;

/// 服务实例：一个提供某服务的 `host:port` 端点
///
/// 相等与哈希只看 `(service_name, host, port)`，元数据不参与比较。
/// 构造后不可变，`with_metadata` 返回新值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    service_name: String,
    host: String,
    port: u16,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl ServiceInstance {
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            host: host.into(),
            port,
            metadata: HashMap::new(),
        }
    }

    /// 追加一个元数据项
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 合并一组元数据
    pub fn with_metadata_map(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 权重，缺失或无法解析时为 [`DEFAULT_WEIGHT`]
    pub fn weight(&self) -> u32 {
        self.metadata
            .get(METADATA_WEIGHT)
            .and_then(|w| w.trim().parse().ok())
            .unwrap_or(DEFAULT_WEIGHT)
    }
}

impl PartialEq for ServiceInstance {
    fn eq(&self, other: &Self) -> bool {
        self.service_name == other.service_name && self.host == other.host && self.port == other.port
    }
}

impl Eq for ServiceInstance {}

impl Hash for ServiceInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service_name.hash(state);
        self.host.hash(state);
        self.port.hash(state);
    }
}
