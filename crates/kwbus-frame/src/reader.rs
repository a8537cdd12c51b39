use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::Message;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Bytes beyond the current frame stay buffered for the next call, so a
/// burst of chunk frames costs one `read` rather than one per frame.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    max_payload: usize,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            max_payload: config.max_payload_size,
        }
    }

    /// Block until one complete frame is buffered and return it.
    ///
    /// A stream that ends between frames yields `ConnectionClosed`; one
    /// that ends inside a frame yields `Malformed`.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.max_payload)? {
                return Ok(frame);
            }
            if self.fill()? == 0 {
                return Err(self.eof_error());
            }
        }
    }

    /// Read and decode the next protocol message.
    pub fn read_message(&mut self) -> Result<Message> {
        Message::decode(&self.read_frame()?)
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Release the stream. Any buffered bytes are discarded.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn eof_error(&self) -> FrameError {
        if self.buf.is_empty() {
            FrameError::ConnectionClosed
        } else {
            FrameError::malformed(
                "frame",
                format!("stream ended {} bytes into a frame", self.buf.len()),
            )
        }
    }
}

impl FrameReader<TcpStream> {
    /// Frame reader for a TCP stream, applying the configured read timeout.
    ///
    /// `read_timeout: None` makes reads block indefinitely.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }

    /// Swap in new limits mid-stream, keeping any bytes already buffered.
    pub fn reconfigure(&mut self, config: FrameConfig) -> Result<()> {
        self.inner.set_read_timeout(config.read_timeout)?;
        self.max_payload = config.max_payload_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::TcpListener;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_frame, MAGIC};
    use crate::kind::{DATA_PACKET, HANDSHAKE_REPLY, HANDSHAKE_REQUEST};
    use crate::message::{DataPacket, HandshakeReply};

    fn wire_of(frames: &[(u16, &[u8])]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for (kind, body) in frames {
            encode_frame(*kind, body, &mut wire).unwrap();
        }
        wire.to_vec()
    }

    #[test]
    fn back_to_back_frames_come_out_in_order() {
        let wire = wire_of(&[(DATA_PACKET, &b"first"[..]), (HANDSHAKE_REQUEST, &b"second"[..])]);
        let mut reader = FrameReader::new(Cursor::new(wire));

        let first = reader.read_frame().unwrap();
        let second = reader.read_frame().unwrap();

        assert_eq!((first.kind, first.payload.as_ref()), (DATA_PACKET, &b"first"[..]));
        assert_eq!(
            (second.kind, second.payload.as_ref()),
            (HANDSHAKE_REQUEST, &b"second"[..])
        );
        assert!(matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn body_larger_than_one_read_chunk() {
        let body = vec![0x5A; 3 * READ_CHUNK_SIZE + 17];
        let mut reader = FrameReader::new(Cursor::new(wire_of(&[(DATA_PACKET, body.as_slice())])));

        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), body.as_slice());
    }

    #[test]
    fn one_byte_reads_are_reassembled() {
        let trickle = Trickle {
            bytes: wire_of(&[(HANDSHAKE_REQUEST, &b"slow"[..])]),
            pos: 0,
            interrupt_next: true,
        };
        let mut reader = FrameReader::new(trickle);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.kind, HANDSHAKE_REQUEST);
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let trickle = Trickle {
            bytes: wire_of(&[(HANDSHAKE_REPLY, &b"\x01"[..])]),
            pos: 0,
            interrupt_next: true,
        };
        let mut reader = FrameReader::new(trickle);

        assert_eq!(
            reader.read_message().unwrap(),
            Message::HandshakeReply(HandshakeReply { supported: true })
        );
    }

    #[test]
    fn truncated_frame_is_malformed() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(16);
        partial.put_u16_le(DATA_PACKET);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        match reader.read_frame().unwrap_err() {
            FrameError::Malformed { what, reason } => {
                assert_eq!(what, "frame");
                assert!(reason.contains("17 bytes"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn oversized_header_is_rejected_before_body() {
        let mut wire = BytesMut::new();
        wire.put_slice(&MAGIC);
        wire.put_u32_le(1024);
        wire.put_u16_le(DATA_PACKET);

        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::PayloadTooLarge { size: 1024, max: 16 })
        ));
    }

    #[test]
    fn read_message_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = crate::writer::FrameWriter::new(stream);
            let packet = DataPacket {
                sequence: 0,
                max: 0,
                keyword: "STATE".to_string(),
                chunk: "x=1".to_string(),
                timestamp: 7,
            };
            writer.write_message(&Message::Data(packet)).unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_secs(5)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_tcp(stream, cfg).unwrap();
        match reader.read_message().unwrap() {
            Message::Data(packet) => {
                assert_eq!(packet.keyword, "STATE");
                assert_eq!(packet.chunk, "x=1");
            }
            other => panic!("unexpected message: {other:?}"),
        }

        server.join().unwrap();
    }

    #[test]
    fn reconfigure_keeps_buffered_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let big = vec![b'z'; 64];

        let sent = big.clone();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = crate::writer::FrameWriter::new(stream);
            writer
                .write_frames(&[
                    Frame::new(HANDSHAKE_REPLY, &b"\x01"[..]),
                    Frame::new(DATA_PACKET, sent),
                ])
                .unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let tight = FrameConfig {
            max_payload_size: 8,
            read_timeout: Some(std::time::Duration::from_secs(5)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_tcp(stream, tight).unwrap();
        assert_eq!(reader.read_frame().unwrap().kind, HANDSHAKE_REPLY);

        reader.reconfigure(FrameConfig::default()).unwrap();
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), big.as_slice());

        server.join().unwrap();
    }

    /// Hands out one byte per call, optionally failing with `Interrupted`
    /// before each byte.
    struct Trickle {
        bytes: Vec<u8>,
        pos: usize,
        interrupt_next: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.interrupt_next = true;
            match self.bytes.get(self.pos) {
                Some(byte) if !buf.is_empty() => {
                    buf[0] = *byte;
                    self.pos += 1;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }
}
