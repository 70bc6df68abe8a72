//! 协议消息与帧编解码
//!
//! 帧格式（大端序）：
//! ```text
//! +-------------+-----------+-----------------+----------+------------+
//! | magic (4)   | version(1)| serializer (1)  | type (1) | compr. (1) |
//! +-------------+-----------+-----------------+----------+------------+
//! | request_id (8)          | body_length (4) | body (body_length)    |
//! +-------------------------+-----------------+-----------------------+
//! ```

use super::constants::{
    CompressorType, HEADER_LENGTH, MAGIC_NUMBER, MAX_BODY_LENGTH, MessageType, PROTOCOL_VERSION,
};
use crate::error::ErrorCode;
use crate::serializer::SerializerType;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// 帧编解码错误
///
/// `Incomplete` 表示缓冲区还不够一帧，与帧损坏严格区分
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("incomplete frame, {needed} more bytes needed")]
    Incomplete { needed: usize },

    #[error("bad magic number 0x{found:08X}")]
    BadMagic { found: u32 },

    #[error("unsupported protocol version {found}")]
    UnsupportedVersion { found: u8 },

    #[error("frame body of {length} bytes exceeds the {max} byte limit", max = MAX_BODY_LENGTH)]
    FrameTooLarge { length: usize },

    #[error("body_length {declared} does not match body size {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("unknown serializer tag {0}")]
    UnknownSerializer(u8),

    #[error("unsupported compressor tag {0}")]
    UnsupportedCompressor(u8),

    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    #[error("i/o error: {0}")]
    Io(String),
}

impl CodecError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CodecError::Incomplete { .. } => ErrorCode::IncompleteFrame,
            CodecError::BadMagic { .. } => ErrorCode::BadMagic,
            CodecError::UnsupportedVersion { .. } => ErrorCode::ProtocolVersionMismatch,
            CodecError::FrameTooLarge { .. } => ErrorCode::MessageTooLarge,
            CodecError::LengthMismatch { .. } | CodecError::UnknownMessageType(_) => {
                ErrorCode::MessageFormatError
            }
            CodecError::UnknownSerializer(_) => ErrorCode::UnknownSerializer,
            CodecError::UnsupportedCompressor(_) => ErrorCode::ProtocolError,
            CodecError::Io(_) => ErrorCode::ConnectionClosed,
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Io(err.to_string())
    }
}

/// 协议消息（一帧）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub magic: u32,
    pub version: u8,
    pub serializer_type: u8,
    pub message_type: u8,
    pub compressor_type: u8,
    pub request_id: u64,
    pub body_length: u32,
    pub body: Bytes,
}

impl ProtocolMessage {
    /// 创建消息，`body_length` 由 body 推导
    pub fn new(
        message_type: MessageType,
        serializer: SerializerType,
        request_id: u64,
        body: impl Into<Bytes>,
    ) -> Self {
        let body = body.into();
        Self {
            magic: MAGIC_NUMBER,
            version: PROTOCOL_VERSION,
            serializer_type: serializer.as_u8(),
            message_type: message_type.as_u8(),
            compressor_type: CompressorType::None.as_u8(),
            request_id,
            body_length: body.len() as u32,
            body,
        }
    }

    pub fn request(serializer: SerializerType, request_id: u64, body: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Request, serializer, request_id, body)
    }

    pub fn response(serializer: SerializerType, request_id: u64, body: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Response, serializer, request_id, body)
    }

    /// 消息类型
    pub fn kind(&self) -> Result<MessageType, CodecError> {
        MessageType::from_u8(self.message_type)
            .ok_or(CodecError::UnknownMessageType(self.message_type))
    }

    /// 压缩类型
    pub fn compressor(&self) -> Result<CompressorType, CodecError> {
        CompressorType::from_u8(self.compressor_type)
            .ok_or(CodecError::UnsupportedCompressor(self.compressor_type))
    }

    /// 序列化类型
    pub fn serializer(&self) -> Result<SerializerType, CodecError> {
        SerializerType::from_u8(self.serializer_type)
            .ok_or(CodecError::UnknownSerializer(self.serializer_type))
    }

    /// 编码后的总长度
    pub fn encoded_len(&self) -> usize {
        HEADER_LENGTH + self.body.len()
    }

    /// 编码为一帧
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_to(&mut dst)?;
        Ok(dst.freeze())
    }

    /// 编码并追加到缓冲区
    pub fn encode_to(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        if self.body_length as usize != self.body.len() {
            return Err(CodecError::LengthMismatch {
                declared: self.body_length,
                actual: self.body.len(),
            });
        }
        if self.body.len() > MAX_BODY_LENGTH {
            return Err(CodecError::FrameTooLarge {
                length: self.body.len(),
            });
        }

        dst.reserve(self.encoded_len());
        dst.put_u32(self.magic);
        dst.put_u8(self.version);
        dst.put_u8(self.serializer_type);
        dst.put_u8(self.message_type);
        dst.put_u8(self.compressor_type);
        dst.put_u64(self.request_id);
        dst.put_u32(self.body_length);
        dst.put_slice(&self.body);
        Ok(())
    }

    /// 从缓冲区解码一帧
    ///
    /// 先校验头部，魔数不对时立即失败，不会读取任何 body 字节；
    /// 缓冲区不足时返回 [`CodecError::Incomplete`]。多余的尾部字节被忽略。
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut message = Self::decode_header(buf)?;
        let total = HEADER_LENGTH + message.body_length as usize;
        if buf.len() < total {
            return Err(CodecError::Incomplete {
                needed: total - buf.len(),
            });
        }
        message.body = Bytes::copy_from_slice(&buf[HEADER_LENGTH..total]);
        Ok(message)
    }

    /// 只解析头部，返回 body 为空的消息
    fn decode_header(buf: &[u8]) -> Result<Self, CodecError> {
        // 魔数够 4 字节就先校验
        if buf.len() >= 4 {
            let magic = (&buf[..4]).get_u32();
            if magic != MAGIC_NUMBER {
                return Err(CodecError::BadMagic { found: magic });
            }
        }
        if buf.len() < HEADER_LENGTH {
            return Err(CodecError::Incomplete {
                needed: HEADER_LENGTH - buf.len(),
            });
        }

        let mut header = &buf[..HEADER_LENGTH];
        let magic = header.get_u32();
        let version = header.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion { found: version });
        }
        let serializer_type = header.get_u8();
        let message_type = header.get_u8();
        let compressor_type = header.get_u8();
        let request_id = header.get_u64();
        let body_length = header.get_u32();
        if body_length as usize > MAX_BODY_LENGTH {
            return Err(CodecError::FrameTooLarge {
                length: body_length as usize,
            });
        }

        Ok(Self {
            magic,
            version,
            serializer_type,
            message_type,
            compressor_type,
            request_id,
            body_length,
            body: Bytes::new(),
        })
    }
}
