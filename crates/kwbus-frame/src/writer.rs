use std::io::{self, ErrorKind, Write};
use std::net::TcpStream;

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Writes frames to any `Write` stream.
///
/// Frames are encoded into an internal buffer and written with one
/// `write_all` per call, followed by a flush. A write timeout surfaces as
/// `FrameError::Io` (`WouldBlock`/`TimedOut`) and is not retried.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            config,
        }
    }

    /// Write one frame.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_frames(std::slice::from_ref(frame))
    }

    /// Write a batch of frames back to back, flushing once at the end.
    ///
    /// Every frame is size-checked before any byte is written, so an
    /// oversized frame never leaves a partial batch on the stream.
    pub fn write_frames(&mut self, frames: &[Frame]) -> Result<()> {
        let max = self.config.max_payload_size;
        if let Some(frame) = frames.iter().find(|f| f.payload.len() > max) {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max,
            });
        }

        self.buf.clear();
        self.buf
            .reserve(frames.iter().map(Frame::wire_size).sum());
        for frame in frames {
            encode_frame(frame.kind, &frame.payload, &mut self.buf)?;
        }

        self.inner.write_all(&self.buf).map_err(closed_on_write_zero)?;
        self.inner.flush().map_err(closed_on_write_zero)
    }

    /// Encode and write a protocol message.
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        self.write_frame(&message.encode())
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameWriter<TcpStream> {
    /// Frame writer for a TCP stream, applying the configured write timeout.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

fn closed_on_write_zero(err: io::Error) -> FrameError {
    if err.kind() == ErrorKind::WriteZero {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(err)
    }
}
