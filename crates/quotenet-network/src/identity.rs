//! Node identity: loading and encoding libp2p keypairs.
//!
//! Keys are stored as the hex encoding of libp2p's protobuf private-key
//! format, the same bytes any libp2p implementation produces with its
//! "marshal private key" call. Ed25519, secp256k1, ECDSA and RSA keys
//! are accepted.

use std::path::Path;

use libp2p::identity::Keypair;

use quotenet_types::config::KeyFileConfig;
use quotenet_types::{QuotenetError, Result};

/// Decodes a hex-encoded, protobuf-serialized private key.
///
/// # Errors
///
/// Returns `QuotenetError::CryptoError` if the string is not valid hex
/// or the bytes are not a supported protobuf private key.
pub fn keypair_from_hex(encoded: &str) -> Result<Keypair> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| QuotenetError::CryptoError {
        reason: format!("failed to decode private key string: {e}"),
    })?;

    Keypair::from_protobuf_encoding(&bytes).map_err(|e| QuotenetError::CryptoError {
        reason: format!("failed to unmarshal private key: {e}"),
    })
}

/// Encodes a keypair in the hex/protobuf form read by [`keypair_from_hex`].
///
/// # Errors
///
/// Returns `QuotenetError::CryptoError` for key types libp2p cannot
/// serialize.
pub fn keypair_to_hex(keypair: &Keypair) -> Result<String> {
    let bytes = keypair
        .to_protobuf_encoding()
        .map_err(|e| QuotenetError::CryptoError {
            reason: format!("failed to marshal private key: {e}"),
        })?;
    Ok(hex::encode(bytes))
}

/// Reads the key file at `path` and decodes its private key.
///
/// # Errors
///
/// `ConfigError` when the file is missing or malformed, `CryptoError`
/// when the key itself cannot be decoded.
pub fn load_keypair(path: &Path) -> Result<Keypair> {
    let config = KeyFileConfig::load(path)?;
    keypair_from_hex(&config.private_key)
}

/// Generates a fresh Ed25519 identity for an ephemeral node.
pub fn generate_keypair() -> Keypair {
    Keypair::generate_ed25519()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
