//! quotenet libp2p network layer.
//!
//! Provides the Host that the node runtime drives: peer identity,
//! transports, Kademlia-based rendezvous discovery, gossipsub topics,
//! relay announcement, and connection tracking.
//!
//! # Architecture
//!
//! - [`identity`]: Decode hex key files into libp2p identities
//! - [`transport`]: TCP transport tuning for the swarm builder
//! - [`discovery`]: Kademlia DHT + Identify behaviour
//! - [`rendezvous`]: Topic → DHT key derivation
//! - [`gossip`]: Gossipsub construction and publish helpers
//! - [`relay`]: Relay server behaviour and relay address announcement
//! - [`address_book`]: TTL-bounded peer address store
//! - [`tracker`]: Connected-peer counter
//! - [`protocol`]: `/bootstrap/1.0.0` stream protocol
//! - [`swarm`]: High-level swarm wrapper with event dispatch
//! - [`config`]: Network configuration with defaults

pub mod address_book;
pub mod config;
pub mod discovery;
pub mod events;
pub mod gossip;
pub mod identity;
pub mod protocol;
pub mod relay;
pub mod rendezvous;
pub mod swarm;
pub mod tracker;
pub mod transport;
