//! CBOR 序列化器

use super::{Serializer, SerializerType};
use crate::error::{Result, RpcError};
use crate::value::Value;

/// 基于 ciborium 的序列化器，编码比 JSON 紧凑，字节串原样保存
#[derive(Debug, Default, Clone, Copy)]
pub struct CborSerializer;

impl Serializer for CborSerializer {
    fn serializer_type(&self) -> SerializerType {
        SerializerType::Cbor
    }

    fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| RpcError::serialization(format!("cbor: {}", e)))?;
        Ok(buf)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
        ciborium::from_reader(bytes).map_err(|e| RpcError::serialization(format!("cbor: {}", e)))
    }
}
