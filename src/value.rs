//! 动态值模型
//!
//! 所有 RPC 载荷（请求参数、返回值、响应体）都以 [`Value`] 表达，
//! 序列化器只需要保证 `Value` 的往返精确即可。

use crate::error::{Result, RpcError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 动态值
///
/// 使用相邻标签编码，保证 `Int`/`UInt`/`Float` 以及 `Bytes`/`List`
/// 在任何序列化格式下都能区分开。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(#[serde(with = "float_repr")] f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// 构造空 Map
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    /// 构造字节值
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(data.into())
    }

    /// 类型名，用于错误信息
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::UInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// 按键读取 Map 字段
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// 向 Map 插入字段，非 Map 值会被替换为 Map
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if !matches!(self, Value::Map(_)) {
            self = Value::map();
        }
        if let Value::Map(map) = &mut self {
            map.insert(key.into(), value.into());
        }
        self
    }
}

/// 浮点编码
///
/// JSON 无法表示 NaN 与无穷大，这三个值改写为字符串 `"NaN"`、`"inf"`、`"-inf"`，
/// 有限值保持原生数字。
mod float_repr {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if v.is_infinite() {
            serializer.serialize_str(if *v > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*v)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl<'de> Visitor<'de> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a float or one of \"NaN\", \"inf\", \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }
}

fn mismatch(expected: &str, found: &Value) -> RpcError {
    RpcError::serialization(format!("expected {}, found {}", expected, found.kind()))
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => UInt,
    u16 => UInt,
    u32 => UInt,
    u64 => UInt,
    f32 => Float,
    f64 => Float,
    String => String,
    &str => String,
    Vec<Value> => List,
    BTreeMap<String, Value> => Map,
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl TryFrom<Value> for () {
    type Error = RpcError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::Null => Ok(()),
            other => Err(mismatch("null", &other)),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = RpcError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = RpcError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::Int(n) => Ok(n),
            Value::UInt(n) => {
                i64::try_from(n).map_err(|_| RpcError::serialization("integer out of range"))
            }
            other => Err(mismatch("int", &other)),
        }
    }
}

impl TryFrom<Value> for u64 {
    type Error = RpcError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::UInt(n) => Ok(n),
            Value::Int(n) => {
                u64::try_from(n).map_err(|_| RpcError::serialization("integer out of range"))
            }
            other => Err(mismatch("uint", &other)),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = RpcError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::Float(f) => Ok(f),
            Value::Int(n) => Ok(n as f64),
            Value::UInt(n) => Ok(n as f64),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = RpcError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = RpcError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl TryFrom<Value> for Vec<Value> {
    type Error = RpcError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::List(items) => Ok(items),
            other => Err(mismatch("list", &other)),
        }
    }
}

impl TryFrom<Value> for BTreeMap<String, Value> {
    type Error = RpcError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::Map(map) => Ok(map),
            other => Err(mismatch("map", &other)),
        }
    }
}
