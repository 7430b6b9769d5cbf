//! Topic-derived rendezvous keys.
//!
//! Nodes interested in the same topic meet in the DHT by providing and
//! querying the same key. The key is the SHA2-256 multihash of the
//! topic name, so it lands on the same record as any other libp2p
//! implementation advertising that namespace.

use std::fmt;

use libp2p::kad;
use sha2::{Digest, Sha256};

/// Multihash code for SHA2-256.
const SHA2_256_CODE: u8 = 0x12;

/// Digest length of SHA2-256, in bytes.
const SHA2_256_LEN: u8 = 32;

/// DHT key under which topic participants advertise themselves.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RendezvousKey {
    topic: String,
    multihash: Vec<u8>,
}

impl RendezvousKey {
    /// Derives the key for `topic`.
    pub fn from_topic(topic: &str) -> Self {
        let digest = Sha256::digest(topic.as_bytes());

        let mut multihash = Vec::with_capacity(2 + digest.len());
        multihash.push(SHA2_256_CODE);
        multihash.push(SHA2_256_LEN);
        multihash.extend_from_slice(&digest);

        Self {
            topic: topic.to_owned(),
            multihash,
        }
    }

    /// The topic this key was derived from.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Raw multihash bytes (`0x12 0x20 ‖ sha256(topic)`).
    pub fn as_bytes(&self) -> &[u8] {
        &self.multihash
    }

    /// The key in the form Kademlia provider operations take.
    pub fn to_record_key(&self) -> kad::RecordKey {
        kad::RecordKey::new(&self.multihash)
    }
}

impl fmt::Display for RendezvousKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.multihash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_topic_same_key() {
        assert_eq!(
            RendezvousKey::from_topic("fx-quotes"),
            RendezvousKey::from_topic("fx-quotes")
        );
    }

    #[test]
    fn different_topics_different_keys() {
        let a = RendezvousKey::from_topic("fx-quotes");
        let b = RendezvousKey::from_topic("crypto-quotes");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn key_is_sha256_multihash() {
        let key = RendezvousKey::from_topic("abc");
        let bytes = key.as_bytes();
        assert_eq!(bytes.len(), 34);
        assert_eq!(&bytes[..2], &[0x12, 0x20]);
        assert_eq!(
            hex::encode(&bytes[2..]),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_topic_is_still_a_valid_key() {
        let key = RendezvousKey::from_topic("");
        assert_eq!(key.as_bytes().len(), 34);
        assert_eq!(key.topic(), "");
    }

    #[test]
    fn record_key_wraps_multihash() {
        let key = RendezvousKey::from_topic("fx-quotes");
        assert_eq!(key.to_record_key().to_vec(), key.as_bytes());
    }

    #[test]
    fn display_is_hex() {
        let key = RendezvousKey::from_topic("abc");
        assert!(key.to_string().starts_with("1220ba7816bf"));
    }
}
