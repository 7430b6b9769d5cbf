//! Core shared types for the quotenet peer-to-peer quote network.
//!
//! Every crate in the workspace reports failures through
//! [`QuotenetError`]. The type is deliberately free of libp2p types so
//! that the protocol crate can depend on it without pulling in the
//! networking stack.

pub mod config;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Unified error type for all quotenet operations.
///
/// Each variant carries a human-readable `reason`. Variants group
/// failures by subsystem so callers can decide whether an error is
/// fatal (startup, DHT) or contained to a single unit of work (one
/// peer, one message).
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum QuotenetError {
    /// A networking or transport operation failed.
    #[error("network error: {reason}")]
    NetworkError {
        /// Human-readable description of the network failure.
        reason: String,
    },

    /// Peer discovery could not complete (DHT query failure or
    /// exhausted search rounds).
    #[error("discovery error: {reason}")]
    DiscoveryError {
        /// Human-readable description of the discovery failure.
        reason: String,
    },

    /// A gossip publish was rejected, typically because no peer is
    /// subscribed to the topic yet.
    #[error("publish error: {reason}")]
    PublishError {
        /// Human-readable description of the publish failure.
        reason: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("protocol error: {reason}")]
    ProtocolError {
        /// Human-readable description of the protocol failure.
        reason: String,
    },

    /// Key material could not be decoded.
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the key failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },

    /// The node event loop is gone or refused the request.
    #[error("node error: {reason}")]
    NodeError {
        /// Human-readable description of the node failure.
        reason: String,
    },
}

/// Convenience result alias used across the workspace.
pub type Result<T> = std::result::Result<T, QuotenetError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_subsystem_and_reason() {
        let err = QuotenetError::PublishError {
            reason: "no peers subscribed".into(),
        };
        assert_eq!(err.to_string(), "publish error: no peers subscribed");
    }

    #[test]
    fn errors_compare_by_value() {
        let a = QuotenetError::ConfigError { reason: "x".into() };
        let b = QuotenetError::ConfigError { reason: "x".into() };
        assert_eq!(a, b);
        assert_ne!(a, QuotenetError::NetworkError { reason: "x".into() });
    }
}
