use std::fs::{self, File};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use super::{data_path, lock_path, FileConfig, LockFile};
use crate::error::{Result, TransportError};
use crate::traits::{Subscriber, TransportKind};

struct Binding {
    address: String,
    keyword: String,
    data: PathBuf,
    lock: PathBuf,
    last_seen: SystemTime,
    payload: String,
}

/// Subscribing side of the file transport.
///
/// Runs no background thread: every `has_update` call checks the data
/// file's modification time under the lock and rereads it when newer.
pub struct FileSubscriber {
    config: FileConfig,
    binding: Option<Binding>,
}

impl FileSubscriber {
    pub fn new() -> Self {
        Self::with_config(FileConfig::default())
    }

    pub fn with_config(config: FileConfig) -> Self {
        Self {
            config,
            binding: None,
        }
    }

    /// Reread the data file if it changed since the last check.
    fn refresh(config: &FileConfig, binding: &mut Binding) -> Result<bool> {
        let _guard = LockFile::acquire(&binding.lock, config)?;
        let modified = fs::metadata(&binding.data)?.modified()?;
        if modified <= binding.last_seen {
            return Ok(false);
        }
        let mut contents = fs::read_to_string(&binding.data)?;
        if contents.ends_with('\n') {
            contents.pop();
        }
        binding.payload = contents;
        binding.last_seen = modified;
        Ok(true)
    }
}

impl Default for FileSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscriber for FileSubscriber {
    fn kind(&self) -> TransportKind {
        TransportKind::File
    }

    fn subscribe(&mut self, address: &str, keyword: &str) -> Result<()> {
        if let Some(binding) = &self.binding {
            return Err(TransportError::AlreadyBound {
                address: binding.address.clone(),
                keyword: binding.keyword.clone(),
            });
        }

        let data = data_path(address, keyword);
        if !data.is_file() {
            return Err(TransportError::NotFound { path: data });
        }
        File::open(&data)?;

        info!(address, keyword, path = ?data, "subscribed over file");
        self.binding = Some(Binding {
            address: address.to_string(),
            keyword: keyword.to_string(),
            lock: lock_path(address, keyword),
            data,
            last_seen: UNIX_EPOCH,
            payload: String::new(),
        });
        Ok(())
    }

    fn unsubscribe(&mut self, address: &str, keyword: &str) {
        match self.binding.take() {
            Some(binding) if binding.address == address && binding.keyword == keyword => {
                info!(address, keyword, "unsubscribed from file");
            }
            other => {
                self.binding = other;
                debug!(address, keyword, "unsubscribe ignored, not subscribed");
            }
        }
    }

    fn request(&self, keyword: &str) -> String {
        match &self.binding {
            Some(binding) if binding.keyword == keyword => binding.payload.clone(),
            _ => String::new(),
        }
    }

    fn has_update(&mut self, keyword: &str) -> bool {
        let Some(binding) = self.binding.as_mut().filter(|b| b.keyword == keyword) else {
            return false;
        };
        match Self::refresh(&self.config, binding) {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(path = ?binding.data, error = %err, "file update check failed");
                false
            }
        }
    }
}
