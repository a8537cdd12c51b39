//! Message kinds carried in the frame header.
//!
//! One socket connection carries exactly one handshake exchange followed by
//! a stream of data packets from the publisher.

/// Subscriber → publisher: requested keyword and client timestamp.
pub const HANDSHAKE_REQUEST: u16 = 1;

/// Publisher → subscriber: whether the keyword is supported.
pub const HANDSHAKE_REPLY: u16 = 2;

/// Publisher → subscriber: one chunk of a keyword update.
pub const DATA_PACKET: u16 = 3;

/// Returns a human-readable name for a message kind.
pub fn kind_name(kind: u16) -> &'static str {
    match kind {
        HANDSHAKE_REQUEST => "HANDSHAKE_REQUEST",
        HANDSHAKE_REPLY => "HANDSHAKE_REPLY",
        DATA_PACKET => "DATA_PACKET",
        _ => "UNKNOWN",
    }
}
