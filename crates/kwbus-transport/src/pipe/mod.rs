//! Named-pipe transport (Unix).
//!
//! The publisher owns a FIFO at `<address>.<keyword>` and writes each
//! update as a sentinel-delimited block of lines. The subscriber keeps the
//! FIFO open read/write and reassembles blocks on a listener thread.

mod fifo;
mod publisher;
mod subscriber;

use std::path::PathBuf;
use std::time::Duration;

pub use publisher::PipePublisher;
pub use subscriber::PipeSubscriber;

/// Pipe transport tuning.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// How long the listener waits for data before checking for shutdown.
    pub poll_interval: Duration,
    /// Permission bits for FIFOs created by the publisher.
    pub fifo_mode: u32,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            fifo_mode: 0o600,
        }
    }
}

pub(crate) fn fifo_path(address: &str, keyword: &str) -> PathBuf {
    PathBuf::from(format!("{address}.{keyword}"))
}
