//! DHT-based rendezvous discovery for the quotenet network.
//!
//! Wraps Kademlia and Identify into a single [`NetworkBehaviour`] that
//! provides:
//!
//! - **Bootstrap**: seed the Kademlia routing table with known peers.
//! - **Advertise**: announce this node as a provider of a
//!   [`RendezvousKey`].
//! - **Find**: query the DHT for other providers of the same key.
//! - **Identify**: exchange listen addresses on every new connection,
//!   which Kademlia uses to populate its routing table.
//!
//! Query results are delivered asynchronously through the swarm and
//! surface as [`crate::events::NetworkEvent`]s.

use std::num::NonZeroUsize;
use std::time::Duration;

use libp2p::identity;
use libp2p::kad;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{identify, Multiaddr, PeerId, StreamProtocol};

use quotenet_types::QuotenetError;

use crate::config::NetworkConfig;
use crate::rendezvous::RendezvousKey;

/// Local alias so we never shadow `std::result::Result` (which the
/// `#[derive(NetworkBehaviour)]` macro needs).
type QResult<T> = std::result::Result<T, QuotenetError>;

// ---------------------------------------------------------------------------
// Combined NetworkBehaviour
// ---------------------------------------------------------------------------

/// Combined network behaviour providing Kademlia DHT and Identify.
#[derive(NetworkBehaviour)]
pub struct DiscoveryBehaviour {
    /// Kademlia DHT for provider records and peer routing.
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,

    /// Identify protocol: exchanges listen addresses and protocols.
    pub identify: identify::Behaviour,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Builds a [`DiscoveryBehaviour`] from the given identity and config.
///
/// # Errors
///
/// Returns `QuotenetError::ConfigError` if the Kademlia replication
/// factor is zero, or `QuotenetError::NetworkError` if a protocol name
/// is invalid.
pub fn build_discovery_behaviour(
    keypair: &identity::Keypair,
    config: &NetworkConfig,
) -> QResult<DiscoveryBehaviour> {
    // --- Kademlia -----------------------------------------------------------

    let local_peer_id = PeerId::from(keypair.public());

    let replication_factor = NonZeroUsize::new(config.kad_replication_factor).ok_or_else(
        || QuotenetError::ConfigError {
            reason: "kad_replication_factor must be greater than 0".into(),
        },
    )?;

    let protocol = StreamProtocol::try_from_owned(config.kad_protocol.clone()).map_err(
        |e| QuotenetError::NetworkError {
            reason: format!("invalid Kademlia protocol name '{}': {e}", config.kad_protocol),
        },
    )?;

    let mut kad_config = kad::Config::new(protocol);
    kad_config.set_query_timeout(Duration::from_secs(config.kad_query_timeout_secs));
    kad_config.set_replication_factor(replication_factor);

    let store = kad::store::MemoryStore::new(local_peer_id);
    let mut kademlia = kad::Behaviour::with_config(local_peer_id, store, kad_config);

    // Left unset, Kademlia stays in client mode until an external
    // address is confirmed and serves no provider records.
    if config.kad_server_mode {
        kademlia.set_mode(Some(kad::Mode::Server));
    }

    // --- Identify -----------------------------------------------------------

    let identify_config = identify::Config::new(config.identify_protocol.clone(), keypair.public())
        .with_agent_version(format!("quotenet/{}", env!("CARGO_PKG_VERSION")));

    let identify = identify::Behaviour::new(identify_config);

    Ok(DiscoveryBehaviour { kademlia, identify })
}

// ---------------------------------------------------------------------------
// DHT operations
// ---------------------------------------------------------------------------

impl DiscoveryBehaviour {
    /// Adds bootstrap nodes to the Kademlia routing table.
    ///
    /// Each multiaddr must contain a `/p2p/<peer_id>` component.
    /// Addresses without a peer ID are skipped with a warning.
    ///
    /// Returns the `(PeerId, address)` pairs that were added.
    ///
    /// # Errors
    ///
    /// Returns `QuotenetError::NetworkError` if addresses were given but
    /// none of them could be parsed.
    pub fn add_bootstrap_nodes(&mut self, nodes: &[Multiaddr]) -> QResult<Vec<(PeerId, Multiaddr)>> {
        let mut added = Vec::with_capacity(nodes.len());

        for addr in nodes {
            match extract_peer_id(addr) {
                Some((peer_id, clean_addr)) => {
                    self.kademlia.add_address(&peer_id, clean_addr.clone());
                    tracing::info!(%peer_id, %addr, "added bootstrap node to Kademlia routing table");
                    added.push((peer_id, clean_addr));
                }
                None => {
                    tracing::warn!(%addr, "skipping bootstrap node: missing /p2p/ component");
                }
            }
        }

        if !nodes.is_empty() && added.is_empty() {
            return Err(QuotenetError::NetworkError {
                reason: "no valid bootstrap nodes found (all missing /p2p/ component)".into(),
            });
        }

        Ok(added)
    }

    /// Initiates a Kademlia bootstrap operation.
    ///
    /// # Errors
    ///
    /// Returns `QuotenetError::DiscoveryError` if the bootstrap cannot
    /// be started (no known peers).
    pub fn bootstrap(&mut self) -> QResult<kad::QueryId> {
        self.kademlia
            .bootstrap()
            .map_err(|e| QuotenetError::DiscoveryError {
                reason: format!("failed to start Kademlia bootstrap: {e}"),
            })
    }

    /// Announces this node as a provider of `key`.
    ///
    /// The record is stored locally at once and replicated to the
    /// closest peers in the background.
    ///
    /// # Errors
    ///
    /// Returns `QuotenetError::DiscoveryError` if the local record store
    /// refuses the record.
    pub fn start_providing(&mut self, key: &RendezvousKey) -> QResult<kad::QueryId> {
        self.kademlia
            .start_providing(key.to_record_key())
            .map_err(|e| QuotenetError::DiscoveryError {
                reason: format!("failed to advertise rendezvous key for '{}': {e}", key.topic()),
            })
    }

    /// Starts a DHT lookup for providers of `key`.
    ///
    /// Results arrive as one or more
    /// `kad::Event::OutboundQueryProgressed` events for the returned id.
    pub fn get_providers(&mut self, key: &RendezvousKey) -> kad::QueryId {
        self.kademlia.get_providers(key.to_record_key())
    }

    /// Adds an address for a peer to the routing table.
    pub fn add_address(&mut self, peer_id: &PeerId, addr: Multiaddr) {
        self.kademlia.add_address(peer_id, addr);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extracts the `PeerId` and the address-without-p2p from a multiaddr.
///
/// Given `/ip4/1.2.3.4/tcp/4001/p2p/12D3KooW...`, returns
/// `Some((PeerId, /ip4/1.2.3.4/tcp/4001))`.
///
/// Returns `None` if the multiaddr does not contain a `/p2p/` component.
pub fn extract_peer_id(addr: &Multiaddr) -> Option<(PeerId, Multiaddr)> {
    let mut clean_addr = Multiaddr::empty();
    let mut peer_id = None;

    for proto in addr.iter() {
        match proto {
            Protocol::P2p(id) => {
                peer_id = Some(id);
            }
            other => {
                clean_addr.push(other);
            }
        }
    }

    peer_id.map(|pid| (pid, clean_addr))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
