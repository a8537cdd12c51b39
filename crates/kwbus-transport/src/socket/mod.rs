//! TCP socket transport.
//!
//! The publisher runs an accept loop that performs a keyword handshake with
//! each connecting subscriber; accepted connections receive every update for
//! their keyword as a sequence of chunked data packets. The subscriber runs
//! a listener thread that reassembles the packets into the shared cache.

mod publisher;
mod subscriber;

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use kwbus_frame::DEFAULT_CHUNK_SIZE;

use crate::error::{Result, TransportError};

pub use publisher::SocketPublisher;
pub use subscriber::SocketSubscriber;

/// Upper bound for handshake frames, before a connection is registered.
const MAX_HANDSHAKE_PAYLOAD: usize = 16 * 1024;

/// Socket transport tuning.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Characters per data packet.
    pub chunk_size: usize,
    /// Bound for every blocking step of the handshake.
    pub handshake_timeout: Duration,
    /// How often the accept loop checks for shutdown.
    pub poll_interval: Duration,
    /// Write timeout on accepted connections; a subscriber that stops
    /// reading is dropped once it expires.
    pub write_timeout: Option<Duration>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            handshake_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Split `host:port`, `:port` or `port` into host and port.
fn split_address(address: &str) -> Result<(&str, u16)> {
    let address = address.trim();
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => (host, port),
        None => ("", address),
    };
    let port = port.parse::<u16>().map_err(|_| TransportError::InvalidAddress {
        address: address.to_string(),
        reason: "expected a numeric port",
    })?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Ok((host, port))
}

fn resolve(address: &str, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|err| TransportError::Connect {
            address: address.to_string(),
            source: err,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::InvalidAddress {
            address: address.to_string(),
            reason: "host did not resolve",
        });
    }
    Ok(addrs)
}

/// Address to listen on. A missing host listens on every interface.
pub(crate) fn bind_addrs(address: &str) -> Result<Vec<SocketAddr>> {
    let (host, port) = split_address(address)?;
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    resolve(address, host, port)
}

/// Address to connect to. A missing host means the local machine.
pub(crate) fn connect_addrs(address: &str) -> Result<Vec<SocketAddr>> {
    let (host, port) = split_address(address)?;
    let host = if host.is_empty() { "127.0.0.1" } else { host };
    resolve(address, host, port)
}
