//! 序列化器模块
//!
//! 帧头中的 `serializer_type` 在解码时选择具体实现：
//! - `1` = JSON（serde_json）
//! - `2` = CBOR（ciborium）
//!
//! 未知编号是致命的协议错误，从不回退到默认实现。

pub mod cbor;
pub mod json;

pub use cbor::CborSerializer;
pub use json::JsonSerializer;

use crate::error::{Result, RpcError};
use crate::protocol::CodecError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 序列化类型
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerType {
    #[default]
    Json = 1,
    Cbor = 2,
}

impl SerializerType {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Json),
            2 => Some(Self::Cbor),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Cbor => "cbor",
        }
    }
}

impl fmt::Display for SerializerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 序列化器 trait
///
/// 对象安全，可以放进 `Arc<dyn Serializer>` 按编号查找
pub trait Serializer: Send + Sync {
    /// 帧头中使用的编号
    fn serializer_type(&self) -> SerializerType;

    /// 将值编码为字节
    fn serialize(&self, value: &Value) -> Result<Vec<u8>>;

    /// 将字节解码为值
    fn deserialize(&self, bytes: &[u8]) -> Result<Value>;
}

/// 带目标类型的序列化辅助方法
pub trait SerializerExt: Serializer {
    fn serialize_as<T: Into<Value>>(&self, value: T) -> Result<Vec<u8>> {
        self.serialize(&value.into())
    }

    fn deserialize_as<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: TryFrom<Value, Error = RpcError>,
    {
        T::try_from(self.deserialize(bytes)?)
    }
}

impl<S: Serializer + ?Sized> SerializerExt for S {}

/// 序列化器注册表：编号 → 实现
#[derive(Clone)]
pub struct SerializerRegistry {
    serializers: HashMap<SerializerType, Arc<dyn Serializer>>,
}

impl SerializerRegistry {
    /// 创建空注册表
    pub fn empty() -> Self {
        Self {
            serializers: HashMap::new(),
        }
    }

    /// 注册（覆盖同编号的已有实现）
    pub fn register(&mut self, serializer: Arc<dyn Serializer>) {
        self.serializers
            .insert(serializer.serializer_type(), serializer);
    }

    /// 按类型获取
    pub fn get(&self, serializer_type: SerializerType) -> Result<Arc<dyn Serializer>> {
        self.serializers
            .get(&serializer_type)
            .cloned()
            .ok_or_else(|| CodecError::UnknownSerializer(serializer_type.as_u8()).into())
    }

    /// 按帧头编号获取，未知编号返回协议错误
    pub fn get_by_tag(&self, tag: u8) -> Result<Arc<dyn Serializer>> {
        let serializer_type =
            SerializerType::from_u8(tag).ok_or(CodecError::UnknownSerializer(tag))?;
        self.get(serializer_type)
    }
}

impl Default for SerializerRegistry {
    /// 内置 JSON 与 CBOR
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(JsonSerializer));
        registry.register(Arc::new(CborSerializer));
        registry
    }
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.serializers.keys().collect();
        types.sort_by_key(|t| t.as_u8());
        f.debug_struct("SerializerRegistry")
            .field("types", &types)
            .finish()
    }
}
