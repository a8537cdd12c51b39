//! Sentinel framing for line streams (named pipes).
//!
//! A message is the lines between a start and an end sentinel. Content lines
//! are concatenated with a trailing newline each; lines outside a start/end
//! span are dropped.

/// Line that opens a message.
pub const START_SENTINEL: &str = "#START_PIPE_COMMUNICATION";

/// Line that closes a message.
pub const END_SENTINEL: &str = "#END_PIPE_COMMUNICATION";

/// Encode `payload` as one sentinel-delimited block, ready to write.
///
/// Payload lines equal to a sentinel would split the frame on the reading
/// side; callers own that restriction.
pub fn encode_block(payload: &str) -> String {
    let mut block =
        String::with_capacity(START_SENTINEL.len() + END_SENTINEL.len() + payload.len() + 3);
    block.push_str(START_SENTINEL);
    block.push('\n');
    for line in payload.lines() {
        block.push_str(line);
        block.push('\n');
    }
    block.push_str(END_SENTINEL);
    block.push('\n');
    block
}

/// Receive-side state machine for sentinel framing.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: String,
    recording: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (with or without its line terminator).
    ///
    /// Returns the message text when `line` closes a recorded span.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line == START_SENTINEL {
            self.buffer.clear();
            self.recording = true;
            return None;
        }
        if !self.recording {
            return None;
        }
        if line == END_SENTINEL {
            self.recording = false;
            return Some(std::mem::take(&mut self.buffer));
        }

        self.buffer.push_str(line);
        self.buffer.push('\n');
        None
    }

    /// Whether the assembler is inside a start/end span.
    pub fn is_recording(&self) -> bool {
        self.recording
    }
}
