//! Endpoint configuration loaded from JSON.
//!
//! ```json
//! { "endpoints": [
//!     { "kind": "socket", "address": "127.0.0.1:7400" },
//!     { "kind": "file",   "address": "/tmp/kwbus/bus" }
//! ] }
//! ```

use std::collections::HashSet;
use std::path::Path;

use kwbus_transport::TransportKind;
use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// One transport endpoint of a hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub kind: TransportKind,
    pub address: String,
}

/// Set of endpoints a hub is populated from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl HubConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: HubConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| HubError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Addresses must be non-empty and unique; a hub keys transports by
    /// address.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.address.trim().is_empty() {
                return Err(HubError::Config(format!(
                    "{} endpoint has an empty address",
                    endpoint.kind
                )));
            }
            if !seen.insert(endpoint.address.as_str()) {
                return Err(HubError::Config(format!(
                    "duplicate address {:?}",
                    endpoint.address
                )));
            }
        }
        Ok(())
    }
}
