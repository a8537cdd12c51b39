use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use kwbus_frame::LineAssembler;
use tracing::{debug, info, warn};

use super::fifo::wait_readable;
use super::{fifo_path, PipeConfig};
use crate::cache::UpdateCache;
use crate::error::{Result, TransportError};
use crate::traits::{Subscriber, TransportKind};

const READ_CHUNK_SIZE: usize = 4096;

struct Listener {
    address: String,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Listener {
    /// Ask the loop to exit. Reads never block, so it notices within one
    /// poll interval and drops the file handle on the way out.
    fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Subscribing side of the named-pipe transport.
///
/// Runs one listener thread per keyword. Each opens its FIFO read/write so
/// the stream never hits end-of-file while the subscriber is alive.
pub struct PipeSubscriber {
    config: PipeConfig,
    cache: Arc<UpdateCache>,
    listeners: HashMap<String, Listener>,
}

impl PipeSubscriber {
    pub fn new() -> Self {
        Self::with_config(PipeConfig::default())
    }

    pub fn with_config(config: PipeConfig) -> Self {
        Self {
            config,
            cache: Arc::new(UpdateCache::new()),
            listeners: HashMap::new(),
        }
    }

    /// Whether a listener for `keyword` is still running.
    pub fn is_listening(&self, keyword: &str) -> bool {
        self.listeners
            .get(keyword)
            .is_some_and(|l| !l.handle.is_finished())
    }
}

impl Default for PipeSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscriber for PipeSubscriber {
    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
    }

    fn subscribe(&mut self, address: &str, keyword: &str) -> Result<()> {
        if let Some(listener) = self.listeners.get(keyword) {
            if !listener.handle.is_finished() {
                return Err(TransportError::AlreadyBound {
                    address: listener.address.clone(),
                    keyword: keyword.to_string(),
                });
            }
            self.listeners.remove(keyword);
        }

        let path = fifo_path(address, keyword);
        if !path.exists() {
            return Err(TransportError::NotFound { path });
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)?;

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let cache = Arc::clone(&self.cache);
            let stop = Arc::clone(&stop);
            let keyword = keyword.to_string();
            let interval = self.config.poll_interval;
            thread::Builder::new()
                .name(format!("kwbus-pipe-sub-{address}"))
                .spawn(move || listen_loop(file, &keyword, &cache, &stop, interval))?
        };

        info!(address, keyword, ?path, "subscribed over pipe");
        self.listeners.insert(
            keyword.to_string(),
            Listener {
                address: address.to_string(),
                stop,
                handle,
            },
        );
        Ok(())
    }

    fn unsubscribe(&mut self, address: &str, keyword: &str) {
        match self.listeners.get(keyword) {
            Some(listener) if listener.address == address => {
                if let Some(listener) = self.listeners.remove(keyword) {
                    listener.stop();
                }
                self.cache.remove(keyword);
                info!(address, keyword, "unsubscribed from pipe");
            }
            _ => debug!(address, keyword, "unsubscribe ignored, not subscribed"),
        }
    }

    fn request(&self, keyword: &str) -> String {
        self.cache.payload(keyword)
    }

    fn has_update(&mut self, keyword: &str) -> bool {
        self.cache.take_fresh(keyword)
    }

    fn take_update(&mut self, keyword: &str) -> Option<String> {
        self.cache.take_fresh_payload(keyword)
    }
}

impl Drop for PipeSubscriber {
    fn drop(&mut self) {
        for (_, listener) in self.listeners.drain() {
            listener.stop();
        }
    }
}

fn listen_loop(
    mut file: File,
    keyword: &str,
    cache: &UpdateCache,
    stop: &AtomicBool,
    interval: Duration,
) {
    let mut assembler = LineAssembler::new();
    // Bytes of a line whose terminator has not arrived yet.
    let mut pending = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    while !stop.load(Ordering::SeqCst) {
        match wait_readable(&file, interval) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => {
                warn!(keyword, error = %err, "pipe poll failed");
                break;
            }
        }

        let read = match file.read(&mut chunk) {
            Ok(0) => {
                thread::sleep(interval);
                continue;
            }
            Ok(n) => n,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                continue
            }
            Err(err) => {
                warn!(keyword, error = %err, "pipe listener failed");
                break;
            }
        };
        pending.extend_from_slice(&chunk[..read]);

        for line in drain_lines(&mut pending) {
            let Ok(line) = String::from_utf8(line) else {
                warn!(keyword, "discarding non-UTF-8 pipe line");
                continue;
            };
            if let Some(payload) = assembler.push_line(&line) {
                debug!(keyword, size = payload.len(), "pipe message received");
                cache.store(keyword, payload);
            }
        }
    }
    debug!(keyword, "pipe listener stopped");
}

/// Split off every complete `\n`-terminated line, leaving the unterminated
/// tail in `pending`.
fn drain_lines(pending: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let Some(last) = pending.iter().rposition(|b| *b == b'\n') else {
        return Vec::new();
    };
    let tail = pending.split_off(last + 1);
    let complete = std::mem::replace(pending, tail);
    complete
        .split_inclusive(|b| *b == b'\n')
        .map(<[u8]>::to_vec)
        .collect()
}
