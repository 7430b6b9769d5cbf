//! quotenet node runtime.
//!
//! Ties the network layer into a running peer: the [`node::Node`]
//! lifecycle, a single event loop task that owns the swarm, the
//! rendezvous [`discovery::PeerDiscovery`] state machine, topic handles
//! for publishing and subscribing, and the console quote loops.
//!
//! # Modules
//!
//! - [`node`]: `Node` lifecycle, roles and options
//! - [`command`]: commands accepted by the event loop and status replies
//! - [`events`]: events emitted to the node's consumer
//! - [`discovery`]: sans-IO peer discovery state machine
//! - [`pubsub`]: `PubSubChannel`, `Topic` and `Subscription`
//! - [`quote_io`]: send/receive loops over async readers and writers

pub mod command;
pub mod discovery;
pub mod events;
pub mod node;
pub mod pubsub;
pub mod quote_io;

pub(crate) mod event_loop;
