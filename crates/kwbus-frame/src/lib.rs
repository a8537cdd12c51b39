//! Wire framing for kwbus.
//!
//! Socket connections carry length-prefixed frames:
//! - A 2-byte magic number ("KW") for stream synchronization
//! - A 4-byte little-endian body length
//! - A 2-byte little-endian message kind
//!
//! On top of the frames sit the handshake and data messages, the payload
//! chunking rules and their reassembly. Named pipes use plain text lines
//! delimited by sentinel lines instead ([`lines`]).

pub mod chunk;
pub mod codec;
pub mod error;
pub mod kind;
pub mod lines;
pub mod message;
pub mod reader;
pub mod writer;

pub use chunk::{split_chunks, Reassembler, DEFAULT_CHUNK_SIZE};
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use kind::{kind_name, DATA_PACKET, HANDSHAKE_REPLY, HANDSHAKE_REQUEST};
pub use lines::{encode_block, LineAssembler, END_SENTINEL, START_SENTINEL};
pub use message::{DataPacket, HandshakeReply, HandshakeRequest, Message};
pub use reader::FrameReader;
pub use writer::FrameWriter;
