//! JSON 序列化器

use super::{Serializer, SerializerType};
use crate::error::{Result, RpcError};
use crate::value::Value;

/// 基于 serde_json 的序列化器
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serializer_type(&self) -> SerializerType {
        SerializerType::Json
    }

    fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| RpcError::serialization(format!("json: {}", e)))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| RpcError::serialization(format!("json: {}", e)))
    }
}
