//! 线协议模块
//!
//! 20 字节固定头部 + 变长消息体，以及请求/响应载荷的 `Value` 表达

pub mod codec;
pub mod constants;
pub mod message;
pub mod payload;

pub use codec::MessageCodec;
pub use constants::{
    CompressorType, HEADER_LENGTH, MAGIC_NUMBER, MAX_BODY_LENGTH, MessageType, PROTOCOL_VERSION,
};
pub use message::{CodecError, ProtocolMessage};
pub use payload::{RpcRequest, RpcResponse};
