use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// The address string cannot be used by this transport.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress {
        address: String,
        reason: &'static str,
    },

    /// The instance is already bound; unbind before binding again.
    #[error("already bound to {address} for keyword {keyword:?}")]
    AlreadyBound { address: String, keyword: String },

    /// The keyword is not bound on this instance.
    #[error("keyword {keyword:?} is not bound")]
    NotBound { keyword: String },

    /// The remote side does not serve the requested keyword.
    #[error("{address} does not support keyword {keyword:?}")]
    UnsupportedKeyword { address: String, keyword: String },

    /// The handshake did not follow the protocol.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The lock file stayed in place longer than the configured limit.
    #[error("timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// A file the transport expects to exist is missing.
    #[error("{path} does not exist")]
    NotFound { path: PathBuf },

    /// An existing path is not a FIFO.
    #[error("{path} exists and is not a fifo")]
    NotAFifo { path: PathBuf },

    /// Frame-level error on a socket connection.
    #[error("frame error: {0}")]
    Frame(#[from] kwbus_frame::FrameError),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
