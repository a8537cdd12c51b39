use std::path::PathBuf;

/// Errors raised while building hubs from configuration.
///
/// Runtime hub operations never fail; they log and report booleans.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The configuration is well-formed JSON but not usable.
    #[error("invalid hub configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A transport could not be constructed.
    #[error("transport error: {0}")]
    Transport(#[from] kwbus_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, HubError>;
