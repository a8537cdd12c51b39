use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: magic (2) + length (4) + kind (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "KW" (0x4B 0x57).
pub const MAGIC: [u8; 2] = [0x4B, 0x57];

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One framed protocol message.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Message kind, see [`crate::kind`].
    pub kind: u16,
    /// Encoded message body.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Append one frame to `dst`: `"KW"`, body length as u32 LE, kind as
/// u16 LE, then the body.
pub fn encode_frame(kind: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u16_le(kind);
    dst.put_slice(payload);
    Ok(())
}

/// Take one complete frame off the front of `src`.
///
/// `Ok(None)` leaves `src` untouched until more bytes arrive. The length
/// limit is checked as soon as the header is in, before the body is
/// buffered.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(mut header) = src.get(..HEADER_SIZE) else {
        return Ok(None);
    };
    if header[..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }
    header.advance(2);
    let len = header.get_u32_le() as usize;
    let kind = header.get_u16_le();

    if len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: max_payload,
        });
    }
    if src.len() < HEADER_SIZE + len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(Frame::new(kind, src.split_to(len).freeze())))
}

/// Limits applied by [`crate::FrameReader`] and [`crate::FrameWriter`].
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest accepted frame body. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Socket read timeout; `None` blocks indefinitely.
    pub read_timeout: Option<std::time::Duration>,
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
