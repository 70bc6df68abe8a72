//! 流式帧编解码器，配合 `tokio_util::codec::Framed` 使用

use super::message::{CodecError, ProtocolMessage};
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// 协议帧编解码器
///
/// 数据不足一帧时等待更多字节；魔数错误立即返回错误且不消费缓冲区；
/// 连接在帧中途关闭时由 `decode_eof` 报告为 I/O 错误。
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl MessageCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for MessageCodec {
    type Item = ProtocolMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match ProtocolMessage::decode(src) {
            Ok(message) => {
                src.advance(message.encoded_len());
                Ok(Some(message))
            }
            Err(CodecError::Incomplete { needed }) => {
                src.reserve(needed);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl Encoder<ProtocolMessage> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: ProtocolMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_to(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HEADER_LENGTH;
    use crate::serializer::SerializerType;
    use bytes::Bytes;

    #[test]
    fn decodes_two_frames_from_one_buffer() {
        let first = ProtocolMessage::request(SerializerType::Json, 1, Bytes::from_static(b"a"));
        let second = ProtocolMessage::request(SerializerType::Cbor, 2, Bytes::from_static(b"bc"));

        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(first.clone(), &mut buf).unwrap();
        codec.encode(second.clone(), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(first));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(second));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_partial_frame() {
        let msg = ProtocolMessage::response(SerializerType::Json, 9, Bytes::from_static(b"hello"));
        let encoded = msg.encode().unwrap();

        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&encoded[..12]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 12);

        buf.extend_from_slice(&encoded[12..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(msg));
    }

    #[test]
    fn bad_magic_does_not_consume() {
        let mut buf = BytesMut::from(&[0u8; 24][..]);
        let err = MessageCodec::new().decode(&mut buf).unwrap_err();
        assert_eq!(err, CodecError::BadMagic { found: 0 });
        assert_eq!(buf.len(), 24);
    }

    #[test]
    fn eof_mid_frame_is_io_error() {
        let msg = ProtocolMessage::request(SerializerType::Json, 3, Bytes::from_static(b"xyz"));
        let encoded = msg.encode().unwrap();
        let mut buf = BytesMut::from(&encoded[..HEADER_LENGTH + 1]);
        let err = MessageCodec::new().decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }
}
