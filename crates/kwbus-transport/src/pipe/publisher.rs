use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use kwbus_frame::encode_block;
use tracing::{debug, info, warn};

use super::fifo::{make_fifo, open_writer_nonblocking, readers_gone, set_nonblocking};
use super::{fifo_path, PipeConfig};
use crate::error::{Result, TransportError};
use crate::traits::{DeliveryReport, Publisher, TransportKind};

struct Binding {
    address: String,
    keyword: String,
    path: PathBuf,
    /// (dev, ino) of a FIFO this instance created.
    created_inode: Option<(u64, u64)>,
    writer: Option<File>,
}

impl Binding {
    /// Open the writer if needed. `Ok(false)` when no reader is attached.
    fn ensure_writer(&mut self) -> Result<bool> {
        if let Some(writer) = &self.writer {
            if !readers_gone(writer)? {
                return Ok(true);
            }
            debug!(path = ?self.path, "pipe reader went away");
            self.writer = None;
        }
        match open_writer_nonblocking(&self.path)? {
            Some(file) => {
                set_nonblocking(&file, false)?;
                debug!(path = ?self.path, "pipe reader attached");
                self.writer = Some(file);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether a reader holds the FIFO open right now.
    fn reader_attached(&self) -> bool {
        match &self.writer {
            Some(writer) if matches!(readers_gone(writer), Ok(false)) => true,
            _ => matches!(open_writer_nonblocking(&self.path), Ok(Some(_))),
        }
    }

    fn write_block(&mut self, payload: &str) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let block = encode_block(payload);
        if let Err(err) = writer.write_all(block.as_bytes()).and_then(|()| writer.flush()) {
            if err.kind() == ErrorKind::BrokenPipe {
                debug!(path = ?self.path, "pipe reader went away");
            }
            self.writer = None;
            return Err(err.into());
        }
        Ok(())
    }

    fn release(self) {
        drop(self.writer);
        let Some((dev, ino)) = self.created_inode else {
            return;
        };
        match fs::symlink_metadata(&self.path) {
            Ok(meta) if meta.file_type().is_fifo() && meta.dev() == dev && meta.ino() == ino => {
                debug!(path = ?self.path, "removing fifo");
                if let Err(err) = fs::remove_file(&self.path) {
                    warn!(path = ?self.path, error = %err, "failed to remove fifo");
                }
            }
            Ok(_) => debug!(path = ?self.path, "fifo identity changed; skipping cleanup"),
            Err(_) => {}
        }
    }
}

/// Publishing side of the named-pipe transport.
///
/// Creates the FIFO on `publish` and removes it again on unpublish if it is
/// still the one it created. An update made while no reader is attached is
/// skipped; the next update carries the current value.
pub struct PipePublisher {
    config: PipeConfig,
    binding: Option<Binding>,
}

impl PipePublisher {
    pub fn new() -> Self {
        Self::with_config(PipeConfig::default())
    }

    pub fn with_config(config: PipeConfig) -> Self {
        Self {
            config,
            binding: None,
        }
    }

    /// FIFO of the current binding.
    pub fn path(&self) -> Option<&Path> {
        self.binding.as_ref().map(|b| b.path.as_path())
    }

    fn prepare_fifo(&self, address: &str, path: &Path) -> Result<Option<(u64, u64)>> {
        let bind_err = |source| TransportError::Bind {
            address: address.to_string(),
            source,
        };
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_fifo() => {
                debug!(?path, "reusing existing fifo");
                Ok(None)
            }
            Ok(_) => Err(TransportError::NotAFifo {
                path: path.to_path_buf(),
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                make_fifo(path, self.config.fifo_mode).map_err(bind_err)?;
                fs::set_permissions(path, fs::Permissions::from_mode(self.config.fifo_mode))
                    .map_err(bind_err)?;
                let meta = fs::symlink_metadata(path).map_err(bind_err)?;
                Ok(Some((meta.dev(), meta.ino())))
            }
            Err(err) => Err(bind_err(err)),
        }
    }
}

impl Default for PipePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for PipePublisher {
    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
    }

    fn publish(&mut self, address: &str, keyword: &str) -> Result<()> {
        if let Some(binding) = &self.binding {
            return Err(TransportError::AlreadyBound {
                address: binding.address.clone(),
                keyword: binding.keyword.clone(),
            });
        }

        let path = fifo_path(address, keyword);
        let created_inode = self.prepare_fifo(address, &path)?;

        info!(address, keyword, ?path, "publishing over pipe");
        self.binding = Some(Binding {
            address: address.to_string(),
            keyword: keyword.to_string(),
            path,
            created_inode,
            writer: None,
        });
        Ok(())
    }

    fn unpublish(&mut self, keyword: &str) {
        match self.binding.take() {
            Some(binding) if binding.keyword == keyword => {
                info!(address = %binding.address, keyword, "unpublished pipe keyword");
                binding.release();
            }
            other => {
                self.binding = other;
                debug!(keyword, "unpublish ignored, keyword not published");
            }
        }
    }

    fn update(&mut self, keyword: &str, payload: &str) -> DeliveryReport {
        let mut report = DeliveryReport::new();
        let Some(binding) = self.binding.as_mut().filter(|b| b.keyword == keyword) else {
            report.push(
                keyword,
                Err(TransportError::NotBound {
                    keyword: keyword.to_string(),
                }),
            );
            return report;
        };

        let target = binding.path.display().to_string();
        match binding.ensure_writer() {
            Ok(true) => {
                let result = binding.write_block(payload);
                if let Err(err) = &result {
                    warn!(path = %target, error = %err, "pipe write failed");
                }
                report.push(target, result);
            }
            Ok(false) => {
                debug!(path = %target, "no pipe reader yet, update skipped");
            }
            Err(err) => {
                warn!(path = %target, error = %err, "opening pipe writer failed");
                report.push(target, Err(err));
            }
        }
        report
    }

    fn has_subscribers(&self, keyword: &str) -> bool {
        match &self.binding {
            Some(binding) if binding.keyword == keyword => binding.reader_attached(),
            _ => false,
        }
    }

    fn shutdown(&mut self) -> bool {
        match self.binding.take() {
            Some(binding) => {
                info!(address = %binding.address, "pipe publisher shut down");
                binding.release();
                true
            }
            None => false,
        }
    }
}

impl Drop for PipePublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
