//! Key-file configuration.
//!
//! The bootstrap node reads its identity from a small YAML document:
//!
//! ```yaml
//! private_key: 08011240...
//! ```
//!
//! `private_key` is the hex encoding of a protobuf-serialized libp2p
//! private key. Decoding the key itself happens in
//! `quotenet-network::identity`, which keeps libp2p out of this crate.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{QuotenetError, Result};

/// Default location of the key file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Parsed key-file contents.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct KeyFileConfig {
    /// Hex-encoded, protobuf-serialized private key.
    pub private_key: String,
}

impl KeyFileConfig {
    /// Reads and parses a key file from disk.
    ///
    /// # Errors
    ///
    /// Returns `QuotenetError::ConfigError` if the file cannot be
    /// opened, is not valid YAML, or has an empty `private_key`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| QuotenetError::ConfigError {
            reason: format!("failed to open YAML file '{}': {e}", path.display()),
        })?;
        Self::from_yaml(&raw)
    }

    /// Parses a key file from an in-memory YAML string.
    ///
    /// # Errors
    ///
    /// Returns `QuotenetError::ConfigError` on malformed YAML or an
    /// empty key.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).map_err(|e| QuotenetError::ConfigError {
            reason: format!("failed to parse YAML: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the key field is present and non-blank.
    pub fn validate(&self) -> Result<()> {
        if self.private_key.trim().is_empty() {
            return Err(QuotenetError::ConfigError {
                reason: "private_key must not be empty".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
