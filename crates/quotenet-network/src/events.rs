//! Network events emitted by the quotenet swarm.
//!
//! [`NetworkEvent`] is the unified event type that consumers receive
//! from the swarm. All libp2p-specific events are mapped into this enum
//! before being delivered to higher layers.

use libp2p::kad;
use libp2p::{Multiaddr, PeerId};

// ---------------------------------------------------------------------------
// NetworkEvent
// ---------------------------------------------------------------------------

/// Events emitted by the quotenet network layer.
#[derive(Clone, Debug)]
pub enum NetworkEvent {
    /// The swarm started listening on a new address.
    Listening(Multiaddr),

    /// First connection to a remote peer was established.
    PeerConnected(PeerId),

    /// Last connection to a remote peer was closed.
    PeerDisconnected(PeerId),

    /// An outbound dial failed, or a new peer was refused because the
    /// connection limit was reached. `peer_id` is `None` for dials made
    /// by address only.
    DialFailed {
        peer_id: Option<PeerId>,
        reason: String,
    },

    /// A provider query returned a batch of providers. One query may
    /// produce several batches.
    ProvidersFound {
        query_id: kad::QueryId,
        providers: Vec<PeerId>,
    },

    /// A provider query completed.
    ProviderQueryFinished { query_id: kad::QueryId },

    /// A provider query failed.
    ProviderQueryFailed {
        query_id: kad::QueryId,
        reason: String,
    },

    /// A gossip message was received on a topic.
    GossipMessage {
        /// PeerId of the peer that propagated this message.
        source: PeerId,
        /// Topic string the message was published on.
        topic: String,
        /// Raw payload bytes.
        data: Vec<u8>,
    },

    /// A peer opened a `/bootstrap/1.0.0` stream to this node.
    InboundBootstrapStream { peer_id: PeerId },
}
