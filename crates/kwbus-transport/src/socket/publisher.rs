use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use kwbus_frame::{
    kind_name, split_chunks, DataPacket, Frame, FrameConfig, FrameReader, FrameWriter,
    HandshakeReply, Message,
};
use tracing::{debug, info, warn};

use super::{bind_addrs, SocketConfig, MAX_HANDSHAKE_PAYLOAD};
use crate::cache::unix_millis;
use crate::error::{Result, TransportError};
use crate::traits::{DeliveryReport, Publisher, TransportKind};

/// One accepted subscriber connection.
struct Connection {
    id: u64,
    keyword: String,
    peer: SocketAddr,
    writer: FrameWriter<TcpStream>,
}

impl Connection {
    fn close(&self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

type Registry = Arc<Mutex<Vec<Connection>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, Vec<Connection>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Binding {
    address: String,
    keyword: String,
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

/// Publishing side of the socket transport.
///
/// Serves one keyword per binding. Every update is split into chunks of
/// [`SocketConfig::chunk_size`] characters and written to each connection
/// registered for the keyword; a connection whose write fails is dropped.
pub struct SocketPublisher {
    config: SocketConfig,
    registry: Registry,
    next_id: Arc<AtomicU64>,
    binding: Option<Binding>,
}

impl SocketPublisher {
    pub fn new() -> Self {
        Self::with_config(SocketConfig::default())
    }

    pub fn with_config(config: SocketConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            binding: None,
        }
    }

    /// Address the listener is bound to, if published.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.binding.as_ref().map(|b| b.local_addr)
    }

    /// Number of registered subscriber connections, across keywords.
    pub fn connection_count(&self) -> usize {
        lock(&self.registry).len()
    }

    fn stop_accepting(binding: &mut Binding) {
        binding.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = binding.accept_thread.take() {
            if handle.join().is_err() {
                warn!(address = %binding.address, "accept loop panicked");
            }
        }
    }

    fn drop_connections(&self, keyword: &str) {
        lock(&self.registry).retain(|conn| {
            if conn.keyword != keyword {
                return true;
            }
            debug!(id = conn.id, peer = %conn.peer, "closing subscriber connection");
            conn.close();
            false
        });
    }
}

impl Default for SocketPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for SocketPublisher {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn publish(&mut self, address: &str, keyword: &str) -> Result<()> {
        if let Some(binding) = &self.binding {
            return Err(TransportError::AlreadyBound {
                address: binding.address.clone(),
                keyword: binding.keyword.clone(),
            });
        }

        let addrs = bind_addrs(address)?;
        let listener = TcpListener::bind(&addrs[..]).map_err(|err| TransportError::Bind {
            address: address.to_string(),
            source: err,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let stop = Arc::new(AtomicBool::new(false));
        let ctx = AcceptContext {
            keyword: keyword.to_string(),
            registry: Arc::clone(&self.registry),
            next_id: Arc::clone(&self.next_id),
            stop: Arc::clone(&stop),
            config: self.config.clone(),
        };
        let accept_thread = thread::Builder::new()
            .name(format!("kwbus-accept-{local_addr}"))
            .spawn(move || accept_loop(listener, ctx))?;

        info!(address, %local_addr, keyword, "publishing over socket");
        self.binding = Some(Binding {
            address: address.to_string(),
            keyword: keyword.to_string(),
            local_addr,
            stop,
            accept_thread: Some(accept_thread),
        });
        Ok(())
    }

    fn unpublish(&mut self, keyword: &str) {
        match self.binding.take() {
            Some(mut binding) if binding.keyword == keyword => {
                Self::stop_accepting(&mut binding);
                self.drop_connections(keyword);
                info!(address = %binding.address, keyword, "unpublished socket keyword");
            }
            other => {
                self.binding = other;
                debug!(keyword, "unpublish ignored, keyword not published");
            }
        }
    }

    fn update(&mut self, keyword: &str, payload: &str) -> DeliveryReport {
        let mut report = DeliveryReport::new();

        let chunks = split_chunks(payload, self.config.chunk_size.max(1));
        let max = i32::try_from(chunks.len() - 1).unwrap_or(i32::MAX);
        let timestamp = unix_millis(SystemTime::now());
        let frames: Vec<Frame> = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                Message::Data(DataPacket {
                    sequence: i32::try_from(index).unwrap_or(i32::MAX),
                    max,
                    keyword: keyword.to_string(),
                    chunk: (*chunk).to_string(),
                    timestamp,
                })
                .encode()
            })
            .collect();

        // Writes happen outside the registry lock so the accept loop keeps
        // registering while a slow subscriber drains.
        let targets: Vec<Connection> = {
            let mut registry = lock(&self.registry);
            let (targets, rest): (Vec<Connection>, Vec<Connection>) =
                registry.drain(..).partition(|conn| conn.keyword == keyword);
            *registry = rest;
            targets
        };
        let mut survivors = Vec::with_capacity(targets.len());
        for (conn, result) in send_to_all(targets, &frames) {
            match result {
                Ok(()) => {
                    report.push(conn.peer.to_string(), Ok(()));
                    survivors.push(conn);
                }
                Err(err) => {
                    warn!(id = conn.id, peer = %conn.peer, error = %err, "dropping subscriber after failed send");
                    conn.close();
                    report.push(conn.peer.to_string(), Err(err));
                }
            }
        }
        lock(&self.registry).extend(survivors);

        debug!(
            keyword,
            chunks = frames.len(),
            delivered = report.delivered(),
            "socket update sent"
        );
        report
    }

    fn has_subscribers(&self, keyword: &str) -> bool {
        lock(&self.registry).iter().any(|conn| conn.keyword == keyword)
    }

    fn shutdown(&mut self) -> bool {
        let Some(mut binding) = self.binding.take() else {
            return false;
        };
        Self::stop_accepting(&mut binding);
        for conn in lock(&self.registry).drain(..) {
            conn.close();
        }
        info!(address = %binding.address, "socket publisher shut down");
        true
    }
}

impl Drop for SocketPublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Write `frames` to every connection, each on its own scoped thread so a
/// stalled peer costs the others nothing.
fn send_to_all(targets: Vec<Connection>, frames: &[Frame]) -> Vec<(Connection, Result<()>)> {
    if let [_] = targets.as_slice() {
        return targets
            .into_iter()
            .map(|mut conn| {
                let result = conn.writer.write_frames(frames).map_err(TransportError::from);
                (conn, result)
            })
            .collect();
    }
    thread::scope(|scope| {
        let sends: Vec<_> = targets
            .into_iter()
            .map(|mut conn| {
                scope.spawn(move || {
                    let result = conn.writer.write_frames(frames).map_err(TransportError::from);
                    (conn, result)
                })
            })
            .collect();
        sends
            .into_iter()
            .filter_map(|send| send.join().ok())
            .collect()
    })
}

#[derive(Clone)]
struct AcceptContext {
    keyword: String,
    registry: Registry,
    next_id: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    config: SocketConfig,
}

fn accept_loop(listener: TcpListener, ctx: AcceptContext) {
    while !ctx.stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let id = ctx.next_id.fetch_add(1, Ordering::Relaxed);
                let handshake_ctx = ctx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("kwbus-handshake-{peer}"))
                    .spawn(move || register(stream, peer, id, &handshake_ctx));
                if let Err(err) = spawned {
                    warn!(id, %peer, error = %err, "could not start handshake thread");
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(ctx.config.poll_interval),
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                warn!(error = %err, "accept failed");
                thread::sleep(ctx.config.poll_interval);
            }
        }
    }
    debug!(keyword = %ctx.keyword, "accept loop stopped");
}

/// Handshake one accepted connection and register it unless the binding
/// stopped in the meantime.
fn register(stream: TcpStream, peer: SocketAddr, id: u64, ctx: &AcceptContext) {
    match handshake(stream, &ctx.keyword, &ctx.config) {
        Ok(Some((keyword, writer))) => {
            let conn = Connection {
                id,
                keyword,
                peer,
                writer,
            };
            // Checked under the lock that unpublish also takes to drop connections.
            let mut registry = lock(&ctx.registry);
            if ctx.stop.load(Ordering::SeqCst) {
                debug!(id, %peer, "binding stopped during handshake");
                conn.close();
                return;
            }
            debug!(id, %peer, keyword = %conn.keyword, "subscriber registered");
            registry.push(conn);
        }
        Ok(None) => debug!(id, %peer, "subscriber rejected"),
        Err(err) => warn!(id, %peer, error = %err, "handshake failed"),
    }
}

/// Server side of the keyword handshake.
///
/// Returns the requested keyword and the connection's writer when the
/// keyword is served, `None` after rejecting and closing the connection.
fn handshake(
    stream: TcpStream,
    served: &str,
    config: &SocketConfig,
) -> Result<Option<(String, FrameWriter<TcpStream>)>> {
    stream.set_nonblocking(false)?;
    let frame_config = FrameConfig {
        max_payload_size: MAX_HANDSHAKE_PAYLOAD,
        read_timeout: Some(config.handshake_timeout),
        write_timeout: Some(config.handshake_timeout),
    };
    let mut reader = FrameReader::with_config_tcp(stream.try_clone()?, frame_config.clone())?;
    let mut writer = FrameWriter::with_config_tcp(stream, frame_config)?;

    let request = match reader.read_message()? {
        Message::HandshakeRequest(request) => request,
        other => {
            return Err(TransportError::Handshake(format!(
                "expected HANDSHAKE_REQUEST, got {}",
                kind_name(other.kind())
            )))
        }
    };
    let supported = request.keyword == served;
    debug!(
        keyword = %request.keyword,
        client_timestamp = request.timestamp,
        supported,
        "handshake request"
    );

    writer.write_message(&Message::HandshakeReply(HandshakeReply { supported }))?;
    if !supported {
        let _ = writer.get_ref().shutdown(Shutdown::Both);
        return Ok(None);
    }

    let writer = FrameWriter::with_config_tcp(
        writer.into_inner(),
        FrameConfig {
            write_timeout: config.write_timeout,
            ..FrameConfig::default()
        },
    )?;
    Ok(Some((request.keyword, writer)))
}
