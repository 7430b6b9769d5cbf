//! Transport configuration for the quotenet network layer.
//!
//! Nodes speak TCP (secured with Noise, multiplexed with Yamux) and
//! QUIC, with DNS resolution for `/dns*` multiaddrs and the relay
//! client transport for `/p2p-circuit` addresses. Construction happens
//! inside [`crate::swarm::QuotenetSwarm::new`]:
//!
//! ```text
//! SwarmBuilder::with_existing_identity(keypair)
//!     .with_tokio()
//!     .with_tcp(tcp_config(), noise::Config::new, yamux::Config::default)?
//!     .with_quic()
//!     .with_dns()?
//!     .with_relay_client(noise::Config::new, yamux::Config::default)?
//!     .with_behaviour(|key, relay_client| { ... })?
//!     .build()
//! ```

/// Returns the TCP configuration used by the swarm builder.
///
/// Nagle's algorithm is disabled (`nodelay`); quotes are small and
/// latency-sensitive.
pub fn tcp_config() -> libp2p::tcp::Config {
    libp2p::tcp::Config::default().nodelay(true)
}
