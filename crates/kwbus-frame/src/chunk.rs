//! Payload chunking for the socket protocol and the matching reassembly
//! state machine.

use tracing::{debug, warn};

use crate::message::DataPacket;

/// Characters per data packet.
pub const DEFAULT_CHUNK_SIZE: usize = 32_000;

/// Split `payload` into `floor(L / chunk_size) + 1` pieces of at most
/// `chunk_size` characters, where `L` is the character count.
///
/// The last piece is shorter, or empty when `L` is an exact multiple of
/// `chunk_size`. Splits always fall on character boundaries.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
pub fn split_chunks(payload: &str, chunk_size: usize) -> Vec<&str> {
    assert!(chunk_size > 0, "chunk size must be positive");

    let mut chunks = Vec::with_capacity(payload.len() / chunk_size + 1);
    let mut start = 0usize;
    let mut count = 0usize;
    for (offset, _) in payload.char_indices() {
        if count == chunk_size {
            chunks.push(&payload[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if count == chunk_size {
        chunks.push(&payload[start..]);
        chunks.push("");
    } else {
        chunks.push(&payload[start..]);
    }
    chunks
}

/// Reassembles data packets of one connection into complete payloads.
///
/// Index 0 starts a block. Every following index must be exactly one
/// greater than the previous one; a gap marks the block corrupted and it is
/// dropped when its last index arrives. The assembler starts out of sync,
/// so a block joined halfway is never delivered.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: String,
    last_sequence: i32,
    in_sync: bool,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet. Returns the full payload once a block completes in sync.
    pub fn push(&mut self, packet: &DataPacket) -> Option<String> {
        if packet.sequence == 0 {
            self.buffer.clear();
            self.buffer.push_str(&packet.chunk);
            self.in_sync = true;
        } else if self.in_sync && packet.sequence == self.last_sequence.wrapping_add(1) {
            self.buffer.push_str(&packet.chunk);
        } else {
            if self.in_sync {
                warn!(
                    keyword = %packet.keyword,
                    expected = self.last_sequence.wrapping_add(1),
                    got = packet.sequence,
                    "chunk sequence gap, dropping block"
                );
            }
            self.in_sync = false;
        }
        self.last_sequence = packet.sequence;

        if packet.sequence != packet.max {
            return None;
        }
        if !self.in_sync {
            debug!(keyword = %packet.keyword, "discarding desynchronized block");
            return None;
        }

        self.in_sync = false;
        Some(std::mem::take(&mut self.buffer))
    }

    /// Whether a block is currently being accumulated without gaps.
    pub fn in_sync(&self) -> bool {
        self.in_sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(sequence: i32, max: i32, chunk: &str) -> DataPacket {
        DataPacket {
            sequence,
            max,
            keyword: "PLAN".to_string(),
            chunk: chunk.to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn chunk_count_matches_floor_plus_one() {
        for len in [0usize, 1, 31_999, 32_000, 32_001, 64_000, 100_000] {
            let payload = "p".repeat(len);
            let chunks = split_chunks(&payload, DEFAULT_CHUNK_SIZE);
            assert_eq!(chunks.len(), len / DEFAULT_CHUNK_SIZE + 1, "length {len}");
            assert_eq!(chunks.concat(), payload, "length {len}");
            assert!(chunks.iter().all(|c| c.chars().count() <= DEFAULT_CHUNK_SIZE));
        }
    }

    #[test]
    fn exact_multiple_ends_with_empty_chunk() {
        let chunks = split_chunks("abcdef", 3);
        assert_eq!(chunks, vec!["abc", "def", ""]);
    }

    #[test]
    fn splits_on_character_boundaries() {
        let payload = "äöüß€";
        let chunks = split_chunks(payload, 2);
        assert_eq!(chunks, vec!["äö", "üß", "€"]);
    }

    #[test]
    fn reassembles_in_order_block() {
        let mut asm = Reassembler::new();
        assert_eq!(asm.push(&packet(0, 2, "a")), None);
        assert_eq!(asm.push(&packet(1, 2, "b")), None);
        assert_eq!(asm.push(&packet(2, 2, "c")), Some("abc".to_string()));
    }

    #[test]
    fn single_chunk_block_completes_immediately() {
        let mut asm = Reassembler::new();
        assert_eq!(asm.push(&packet(0, 0, "whole")), Some("whole".to_string()));
    }

    #[test]
    fn gap_discards_block() {
        let mut asm = Reassembler::new();
        assert_eq!(asm.push(&packet(0, 3, "a")), None);
        assert_eq!(asm.push(&packet(1, 3, "b")), None);
        assert_eq!(asm.push(&packet(3, 3, "d")), None);
        assert!(!asm.in_sync());
    }

    #[test]
    fn next_block_after_gap_is_unaffected() {
        let mut asm = Reassembler::new();
        asm.push(&packet(0, 2, "x"));
        asm.push(&packet(2, 2, "z"));
        assert_eq!(asm.push(&packet(0, 1, "he")), None);
        assert_eq!(asm.push(&packet(1, 1, "llo")), Some("hello".to_string()));
    }

    #[test]
    fn joining_mid_block_is_dropped() {
        let mut asm = Reassembler::new();
        assert_eq!(asm.push(&packet(1, 2, "b")), None);
        assert_eq!(asm.push(&packet(2, 2, "c")), None);
    }

    #[test]
    fn split_then_reassemble_large_payload() {
        let payload: String = (0..70_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = split_chunks(&payload, DEFAULT_CHUNK_SIZE);
        let max = (chunks.len() - 1) as i32;

        let mut asm = Reassembler::new();
        let mut result = None;
        for (i, chunk) in chunks.iter().enumerate() {
            result = asm.push(&packet(i as i32, max, chunk));
        }
        assert_eq!(result, Some(payload));
    }
}
