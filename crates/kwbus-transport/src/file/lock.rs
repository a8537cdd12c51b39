use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use super::FileConfig;
use crate::error::{Result, TransportError};

/// Held lock marker. Dropping the guard deletes the marker.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Spin until the marker at `path` can be created.
    ///
    /// Creation uses `create_new`, so checking for the marker and taking it
    /// is one filesystem operation.
    pub fn acquire(path: impl AsRef<Path>, config: &FileConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let start = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    debug!(path = ?path, "lock acquired");
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if let Some(limit) = config.lock_timeout {
                        let waited = start.elapsed();
                        if waited >= limit {
                            return Err(TransportError::LockTimeout { path, waited });
                        }
                    }
                    thread::sleep(config.poll_interval);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = ?self.path, error = %err, "failed to release lock");
            }
        }
    }
}
