use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{data_path, lock_path, FileConfig, LockFile};
use crate::error::{Result, TransportError};
use crate::traits::{DeliveryReport, Publisher, TransportKind};

struct Binding {
    address: String,
    keyword: String,
    data: PathBuf,
    lock: PathBuf,
}

/// Publishing side of the file transport.
///
/// Every update replaces the data file while holding the lock marker.
/// There is no subscriber registry, so `has_subscribers` reports whether
/// the keyword is bound.
pub struct FilePublisher {
    config: FileConfig,
    binding: Option<Binding>,
}

impl FilePublisher {
    pub fn new() -> Self {
        Self::with_config(FileConfig::default())
    }

    pub fn with_config(config: FileConfig) -> Self {
        Self {
            config,
            binding: None,
        }
    }

    /// Data file of the current binding.
    pub fn data_path(&self) -> Option<&Path> {
        self.binding.as_ref().map(|b| b.data.as_path())
    }

    fn write_payload(&self, binding: &Binding, payload: &str) -> Result<()> {
        let _guard = LockFile::acquire(&binding.lock, &self.config)?;
        match fs::remove_file(&binding.data) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        fs::write(&binding.data, format!("{payload}\n"))?;
        Ok(())
    }
}

impl Default for FilePublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Create or truncate `path`.
fn touch(path: &Path) -> std::io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map(drop)
}

impl Publisher for FilePublisher {
    fn kind(&self) -> TransportKind {
        TransportKind::File
    }

    fn publish(&mut self, address: &str, keyword: &str) -> Result<()> {
        if let Some(binding) = &self.binding {
            return Err(TransportError::AlreadyBound {
                address: binding.address.clone(),
                keyword: binding.keyword.clone(),
            });
        }
        if address.is_empty() {
            return Err(TransportError::InvalidAddress {
                address: address.to_string(),
                reason: "expected a file path prefix",
            });
        }

        let data = data_path(address, keyword);
        let lock = lock_path(address, keyword);
        let bind_err = |source| TransportError::Bind {
            address: address.to_string(),
            source,
        };
        touch(&data).map_err(bind_err)?;
        touch(&lock).map_err(bind_err)?;
        fs::remove_file(&lock).map_err(bind_err)?;

        info!(address, keyword, path = ?data, "publishing over file");
        self.binding = Some(Binding {
            address: address.to_string(),
            keyword: keyword.to_string(),
            data,
            lock,
        });
        Ok(())
    }

    fn unpublish(&mut self, keyword: &str) {
        match self.binding.take() {
            Some(binding) if binding.keyword == keyword => {
                info!(address = %binding.address, keyword, "unpublished file keyword");
            }
            other => {
                self.binding = other;
                debug!(keyword, "unpublish ignored, keyword not published");
            }
        }
    }

    fn update(&mut self, keyword: &str, payload: &str) -> DeliveryReport {
        let mut report = DeliveryReport::new();
        match &self.binding {
            Some(binding) if binding.keyword == keyword => {
                let result = self.write_payload(binding, payload);
                debug!(keyword, size = payload.len(), ok = result.is_ok(), "file update written");
                report.push(binding.data.display().to_string(), result);
            }
            _ => {
                report.push(
                    keyword,
                    Err(TransportError::NotBound {
                        keyword: keyword.to_string(),
                    }),
                );
            }
        }
        report
    }

    fn has_subscribers(&self, keyword: &str) -> bool {
        self.binding.as_ref().is_some_and(|b| b.keyword == keyword)
    }

    fn shutdown(&mut self) -> bool {
        match self.binding.take() {
            Some(binding) => {
                info!(address = %binding.address, "file publisher shut down");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn publish_creates_data_file_and_clears_lock() {
        let dir = tempfile::tempdir().unwrap();
        let address = dir.path().join("bus").display().to_string();

        let mut publisher = FilePublisher::new();
        publisher.publish(&address, "STATE").unwrap();

        assert!(data_path(&address, "STATE").exists());
        assert!(!lock_path(&address, "STATE").exists());
        assert!(publisher.has_subscribers("STATE"));
        assert!(!publisher.has_subscribers("PLAN"));
    }

    #[test]
    fn update_writes_newline_terminated_payload() {
        let dir = tempfile::tempdir().unwrap();
        let address = dir.path().join("bus").display().to_string();

        let mut publisher = FilePublisher::new();
        publisher.publish(&address, "PLAN").unwrap();
        let report = publisher.update("PLAN", "go north");

        assert_eq!(report.delivered(), 1);
        let written = fs::read_to_string(data_path(&address, "PLAN")).unwrap();
        assert_eq!(written, "go north\n");
        assert!(!lock_path(&address, "PLAN").exists());
    }

    #[test]
    fn update_for_unbound_keyword_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let address = dir.path().join("bus").display().to_string();

        let mut publisher = FilePublisher::new();
        publisher.publish(&address, "PLAN").unwrap();
        let report = publisher.update("STATE", "x");

        assert_eq!(report.delivered(), 0);
        assert!(matches!(
            report.failures().next(),
            Some((_, TransportError::NotBound { .. }))
        ));
        assert!(!data_path(&address, "STATE").exists());
    }

    #[test]
    fn update_times_out_on_stale_lock() {
        let dir = tempfile::tempdir().unwrap();
        let address = dir.path().join("bus").display().to_string();
        let config = FileConfig {
            lock_timeout: Some(Duration::from_millis(20)),
            ..FileConfig::default()
        };

        let mut publisher = FilePublisher::with_config(config);
        publisher.publish(&address, "STATE").unwrap();
        fs::write(lock_path(&address, "STATE"), b"").unwrap();

        let report = publisher.update("STATE", "x");
        assert!(matches!(
            report.failures().next(),
            Some((_, TransportError::LockTimeout { .. }))
        ));
    }

    #[test]
    fn rebinding_requires_unpublish() {
        let dir = tempfile::tempdir().unwrap();
        let address = dir.path().join("bus").display().to_string();

        let mut publisher = FilePublisher::new();
        publisher.publish(&address, "STATE").unwrap();
        assert!(matches!(
            publisher.publish(&address, "PLAN"),
            Err(TransportError::AlreadyBound { .. })
        ));

        publisher.unpublish("STATE");
        publisher.publish(&address, "PLAN").unwrap();
        assert!(publisher.shutdown());
        assert!(!publisher.shutdown());
    }

    #[test]
    fn publish_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let address = dir.path().join("missing/bus").display().to_string();

        let mut publisher = FilePublisher::new();
        assert!(matches!(
            publisher.publish(&address, "STATE"),
            Err(TransportError::Bind { .. })
        ));
        assert!(publisher.data_path().is_none());
    }
}
