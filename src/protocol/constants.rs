//! 协议常量

/// 魔数，每一帧的前 4 个字节
pub const MAGIC_NUMBER: u32 = 0xCAFE_BABE;

/// 当前协议版本
pub const PROTOCOL_VERSION: u8 = 1;

/// 固定头部长度：magic(4) + version(1) + serializer(1) + type(1) + compressor(1) + request_id(8) + body_length(4)
pub const HEADER_LENGTH: usize = 20;

/// 单帧消息体上限（16 MiB），超出即视为帧损坏
pub const MAX_BODY_LENGTH: usize = 16 * 1024 * 1024;

/// 消息类型
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Request = 1,
    Response = 2,
}

impl MessageType {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 压缩类型
///
/// `Gzip` 只是预留编号，当前不做压缩
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressorType {
    None = 0,
    Gzip = 1,
}

impl CompressorType {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::Gzip),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
