//! Shared-file transport.
//!
//! The publisher rewrites `<address>.<keyword>` on every update; the
//! subscriber polls its modification time. Both sides serialize access
//! through the zero-byte marker `<address>.<keyword>.lock`.
//!
//! A process that dies while holding the lock leaves the marker behind and
//! every later acquisition waits on it. Set [`FileConfig::lock_timeout`] to
//! bound the wait.
//!
//! Freshness is the data file's modification time and nothing else. On a
//! filesystem with coarse timestamps, two updates inside one tick look like
//! one: the subscriber sees the first and misses the second until a later
//! update moves the mtime again.

mod lock;
mod publisher;
mod subscriber;

use std::path::PathBuf;
use std::time::Duration;

pub use lock::LockFile;
pub use publisher::FilePublisher;
pub use subscriber::FileSubscriber;

/// File transport tuning.
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Sleep between attempts to take the lock.
    pub poll_interval: Duration,
    /// Give up on the lock after this long. `None` waits forever.
    pub lock_timeout: Option<Duration>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            lock_timeout: None,
        }
    }
}

pub(crate) fn data_path(address: &str, keyword: &str) -> PathBuf {
    PathBuf::from(format!("{address}.{keyword}"))
}

pub(crate) fn lock_path(address: &str, keyword: &str) -> PathBuf {
    PathBuf::from(format!("{address}.{keyword}.lock"))
}
