//! RPC 请求/响应载荷
//!
//! 两者在线上都表达为 `Value::Map`，由帧头中的序列化器编码。

use crate::error::{Result, RpcError};
use crate::value::Value;

const KEY_SERVICE: &str = "service_name";
const KEY_METHOD: &str = "method_name";
const KEY_ARGS: &str = "args";
const KEY_STATUS: &str = "status";
const KEY_DATA: &str = "data";
const KEY_MESSAGE: &str = "message";

const STATUS_SUCCESS: &str = "success";
const STATUS_ERROR: &str = "error";

/// RPC 请求
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub service_name: String,
    pub method_name: String,
    pub args: Vec<Value>,
}

impl RpcRequest {
    pub fn new(
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            args,
        }
    }
}

impl From<RpcRequest> for Value {
    fn from(req: RpcRequest) -> Self {
        Value::map()
            .with(KEY_SERVICE, req.service_name)
            .with(KEY_METHOD, req.method_name)
            .with(KEY_ARGS, Value::List(req.args))
    }
}

impl TryFrom<Value> for RpcRequest {
    type Error = RpcError;

    fn try_from(value: Value) -> Result<Self> {
        let mut map = value
            .as_map()
            .cloned()
            .ok_or_else(|| RpcError::serialization("rpc request must be a map"))?;
        let service_name = take_string(&mut map, KEY_SERVICE)?;
        let method_name = take_string(&mut map, KEY_METHOD)?;
        let args = match map.remove(KEY_ARGS) {
            Some(Value::List(args)) => args,
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(RpcError::serialization(format!(
                    "rpc request args must be a list, found {}",
                    other.kind()
                )));
            }
        };
        Ok(Self {
            service_name,
            method_name,
            args,
        })
    }
}

/// RPC 响应：成功携带数据，失败携带错误描述
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    Success { data: Value },
    Error { message: String },
}

impl RpcResponse {
    pub fn success(data: impl Into<Value>) -> Self {
        RpcResponse::Success { data: data.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RpcResponse::Error {
            message: message.into(),
        }
    }

    /// 转换为调用结果，错误状态映射为 [`RpcError::Remote`]
    pub fn into_result(self) -> Result<Value> {
        match self {
            RpcResponse::Success { data } => Ok(data),
            RpcResponse::Error { message } => Err(RpcError::Remote { message }),
        }
    }
}

impl From<RpcResponse> for Value {
    fn from(resp: RpcResponse) -> Self {
        match resp {
            RpcResponse::Success { data } => Value::map()
                .with(KEY_STATUS, STATUS_SUCCESS)
                .with(KEY_DATA, data),
            RpcResponse::Error { message } => Value::map()
                .with(KEY_STATUS, STATUS_ERROR)
                .with(KEY_MESSAGE, message),
        }
    }
}

impl TryFrom<Value> for RpcResponse {
    type Error = RpcError;

    fn try_from(value: Value) -> Result<Self> {
        let mut map = value
            .as_map()
            .cloned()
            .ok_or_else(|| RpcError::serialization("rpc response must be a map"))?;
        let status = take_string(&mut map, KEY_STATUS)?;
        match status.as_str() {
            STATUS_SUCCESS => Ok(RpcResponse::Success {
                data: map.remove(KEY_DATA).unwrap_or(Value::Null),
            }),
            STATUS_ERROR => Ok(RpcResponse::Error {
                message: take_string(&mut map, KEY_MESSAGE)?,
            }),
            other => Err(RpcError::serialization(format!(
                "unknown response status '{}'",
                other
            ))),
        }
    }
}

fn take_string(map: &mut std::collections::BTreeMap<String, Value>, key: &str) -> Result<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(RpcError::serialization(format!(
            "field '{}' must be a string, found {}",
            key,
            other.kind()
        ))),
        None => Err(RpcError::serialization(format!("missing field '{}'", key))),
    }
}
