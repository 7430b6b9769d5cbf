//! Events emitted by the node to its consumer.

use libp2p::{Multiaddr, PeerId};

/// Notifications delivered through [`crate::node::Node::take_event_receiver`].
///
/// Delivery is best-effort: if the consumer falls behind and the
/// channel fills up, newer events are dropped and logged.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeEvent {
    /// A listener is up on `/…/p2p/<local id>`.
    Listening(Multiaddr),
    /// First connection to a peer was established.
    PeerConnected(PeerId),
    /// Last connection to a peer closed.
    PeerDisconnected(PeerId),
    /// Discovery connected to a peer advertising the same topic.
    DiscoveryCompleted { peer_id: PeerId },
    /// Discovery stopped without reaching a topic peer.
    DiscoveryFailed { reason: String },
}
