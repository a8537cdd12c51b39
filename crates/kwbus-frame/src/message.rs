//! Socket protocol messages.
//!
//! Bodies use native string framing: every string is a 4-byte little-endian
//! byte length followed by UTF-8. Integers are little-endian.
//!
//! ```text
//! HANDSHAKE_REQUEST  keyword:str  client_timestamp:i64
//! HANDSHAKE_REPLY    supported:u8
//! DATA_PACKET        sequence:i32 max:i32 keyword:str chunk:str server_timestamp:i64
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::Frame;
use crate::error::{FrameError, Result};
use crate::kind::{DATA_PACKET, HANDSHAKE_REPLY, HANDSHAKE_REQUEST};

/// Subscriber's opening message: the keyword it wants and its clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub keyword: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Publisher's answer to a [`HandshakeRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeReply {
    pub supported: bool,
}

/// One chunk of a keyword update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Index of this chunk, `0..=max`.
    pub sequence: i32,
    /// Index of the last chunk of the block.
    pub max: i32,
    pub keyword: String,
    pub chunk: String,
    /// Publisher clock, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Any message that travels over a socket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    HandshakeRequest(HandshakeRequest),
    HandshakeReply(HandshakeReply),
    Data(DataPacket),
}

impl Message {
    /// Message kind written into the frame header.
    pub fn kind(&self) -> u16 {
        match self {
            Message::HandshakeRequest(_) => HANDSHAKE_REQUEST,
            Message::HandshakeReply(_) => HANDSHAKE_REPLY,
            Message::Data(_) => DATA_PACKET,
        }
    }

    /// Encode into a frame.
    pub fn encode(&self) -> Frame {
        let mut body = BytesMut::new();
        match self {
            Message::HandshakeRequest(req) => {
                put_str(&mut body, &req.keyword);
                body.put_i64_le(req.timestamp);
            }
            Message::HandshakeReply(reply) => {
                body.put_u8(u8::from(reply.supported));
            }
            Message::Data(packet) => {
                body.put_i32_le(packet.sequence);
                body.put_i32_le(packet.max);
                put_str(&mut body, &packet.keyword);
                put_str(&mut body, &packet.chunk);
                body.put_i64_le(packet.timestamp);
            }
        }
        Frame::new(self.kind(), body.freeze())
    }

    /// Decode a frame body according to its kind.
    pub fn decode(frame: &Frame) -> Result<Self> {
        let mut body = frame.payload.as_ref();
        let message = match frame.kind {
            HANDSHAKE_REQUEST => {
                let keyword = get_str(&mut body, "handshake request")?;
                let timestamp = get_i64(&mut body, "handshake request")?;
                Message::HandshakeRequest(HandshakeRequest { keyword, timestamp })
            }
            HANDSHAKE_REPLY => {
                if body.remaining() < 1 {
                    return Err(FrameError::malformed("handshake reply", "empty body"));
                }
                let supported = match body.get_u8() {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(FrameError::malformed(
                            "handshake reply",
                            format!("invalid flag {other}"),
                        ))
                    }
                };
                Message::HandshakeReply(HandshakeReply { supported })
            }
            DATA_PACKET => {
                let sequence = get_i32(&mut body, "data packet")?;
                let max = get_i32(&mut body, "data packet")?;
                let keyword = get_str(&mut body, "data packet")?;
                let chunk = get_str(&mut body, "data packet")?;
                let timestamp = get_i64(&mut body, "data packet")?;
                Message::Data(DataPacket {
                    sequence,
                    max,
                    keyword,
                    chunk,
                    timestamp,
                })
            }
            other => return Err(FrameError::UnknownKind(other)),
        };

        if body.has_remaining() {
            return Err(FrameError::malformed(
                "message",
                format!("{} trailing bytes", body.remaining()),
            ));
        }
        Ok(message)
    }
}

fn put_str(dst: &mut BytesMut, value: &str) {
    dst.put_u32_le(value.len() as u32);
    dst.put_slice(value.as_bytes());
}

fn get_str(src: &mut &[u8], what: &'static str) -> Result<String> {
    if src.remaining() < 4 {
        return Err(FrameError::malformed(what, "truncated string length"));
    }
    let len = src.get_u32_le() as usize;
    if src.remaining() < len {
        return Err(FrameError::malformed(
            what,
            format!("string needs {len} bytes, {} left", src.remaining()),
        ));
    }
    let current: &[u8] = *src;
    let (bytes, rest) = current.split_at(len);
    let value = std::str::from_utf8(bytes)
        .map_err(|err| FrameError::malformed(what, err.to_string()))?
        .to_string();
    *src = rest;
    Ok(value)
}

fn get_i32(src: &mut &[u8], what: &'static str) -> Result<i32> {
    if src.remaining() < 4 {
        return Err(FrameError::malformed(what, "truncated i32"));
    }
    Ok(src.get_i32_le())
}

fn get_i64(src: &mut &[u8], what: &'static str) -> Result<i64> {
    if src.remaining() < 8 {
        return Err(FrameError::malformed(what, "truncated i64"));
    }
    Ok(src.get_i64_le())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn data_packet_layout() {
        let frame = Message::Data(DataPacket {
            sequence: 1,
            max: 2,
            keyword: "PLAN".to_string(),
            chunk: "ab".to_string(),
            timestamp: 9,
        })
        .encode();

        assert_eq!(frame.kind, DATA_PACKET);
        let expected: Vec<u8> = [
            &1i32.to_le_bytes()[..],
            &2i32.to_le_bytes()[..],
            &4u32.to_le_bytes()[..],
            &b"PLAN"[..],
            &2u32.to_le_bytes()[..],
            &b"ab"[..],
            &9i64.to_le_bytes()[..],
        ]
        .concat();
        assert_eq!(frame.payload.as_ref(), expected.as_slice());
    }

    #[test]
    fn handshake_request_decodes() {
        let original = Message::HandshakeRequest(HandshakeRequest {
            keyword: "PARAMETERS".to_string(),
            timestamp: -1,
        });
        let decoded = Message::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn non_ascii_chunk_survives() {
        let original = Message::Data(DataPacket {
            sequence: 0,
            max: 0,
            keyword: "STRING".to_string(),
            chunk: "ünïcödé ✓".to_string(),
            timestamp: 0,
        });
        assert_eq!(Message::decode(&original.encode()).unwrap(), original);
    }

    #[test]
    fn rejects_unknown_kind() {
        let frame = Frame::new(99, Bytes::new());
        assert!(matches!(
            Message::decode(&frame),
            Err(FrameError::UnknownKind(99))
        ));
    }

    #[test]
    fn rejects_truncated_string() {
        let mut body = BytesMut::new();
        body.put_u32_le(10);
        body.put_slice(b"abc");
        let frame = Frame::new(HANDSHAKE_REQUEST, body.freeze());
        assert!(matches!(
            Message::decode(&frame),
            Err(FrameError::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_invalid_reply_flag() {
        let frame = Frame::new(HANDSHAKE_REPLY, Bytes::from_static(&[7]));
        assert!(matches!(
            Message::decode(&frame),
            Err(FrameError::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let frame = Frame::new(HANDSHAKE_REPLY, Bytes::from_static(&[1, 0]));
        assert!(matches!(
            Message::decode(&frame),
            Err(FrameError::Malformed { .. })
        ));
    }
}
