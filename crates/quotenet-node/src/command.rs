//! Commands and status types for caller → node communication.
//!
//! [`NodeCommand`] is the bounded-channel message type that the
//! [`crate::pubsub`] handles, the daemon and tests use to drive the
//! node. Each command that produces a result carries a
//! `tokio::sync::oneshot::Sender` for the reply.
//!
//! Commands are processed one at a time inside the event loop, which
//! owns the swarm.

use libp2p::{Multiaddr, PeerId};
use quotenet_network::swarm::DialStart;
use quotenet_types::QuotenetError;
use tokio::sync::oneshot;

use crate::discovery::DiscoveryPhase;
use crate::node::NodeState;
use crate::pubsub::Subscription;

/// Convenience alias to avoid shadowing `std::result::Result`.
type QResult<T> = std::result::Result<T, QuotenetError>;

// ---------------------------------------------------------------------------
// NodeCommand
// ---------------------------------------------------------------------------

/// Commands accepted by the node event loop.
pub enum NodeCommand {
    /// Dial a peer, trying `addrs` first.
    Dial {
        peer_id: PeerId,
        addrs: Vec<Multiaddr>,
        reply: oneshot::Sender<QResult<DialStart>>,
    },

    /// Subscribe to a gossip topic. Replies `true` if the subscription
    /// is new.
    JoinTopic {
        topic: String,
        reply: oneshot::Sender<QResult<bool>>,
    },

    /// Unsubscribe from a topic and end every local subscription to it.
    /// Replies `false` if the topic was not joined.
    LeaveTopic {
        topic: String,
        reply: oneshot::Sender<QResult<bool>>,
    },

    /// Publish raw bytes to a joined topic.
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<QResult<()>>,
    },

    /// Open a local message stream for a joined topic.
    Subscribe {
        topic: String,
        reply: oneshot::Sender<QResult<Subscription>>,
    },

    /// Query the current node status.
    GetStatus {
        /// Reply channel for the status snapshot.
        reply: oneshot::Sender<NodeStatus>,
    },

    /// Stop the event loop. Fire-and-forget; await the `JoinHandle`
    /// returned by [`crate::node::Node::start`] to confirm completion.
    Shutdown,
}

// Manual Debug because oneshot::Sender does not implement Debug.
impl std::fmt::Debug for NodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dial { peer_id, addrs, .. } => f
                .debug_struct("Dial")
                .field("peer_id", peer_id)
                .field("addrs", addrs)
                .finish_non_exhaustive(),
            Self::JoinTopic { topic, .. } => f
                .debug_struct("JoinTopic")
                .field("topic", topic)
                .finish_non_exhaustive(),
            Self::LeaveTopic { topic, .. } => f
                .debug_struct("LeaveTopic")
                .field("topic", topic)
                .finish_non_exhaustive(),
            Self::Publish { topic, data, .. } => f
                .debug_struct("Publish")
                .field("topic", topic)
                .field("len", &data.len())
                .finish_non_exhaustive(),
            Self::Subscribe { topic, .. } => f
                .debug_struct("Subscribe")
                .field("topic", topic)
                .finish_non_exhaustive(),
            Self::GetStatus { .. } => f.write_str("GetStatus"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeStatus
// ---------------------------------------------------------------------------

/// Snapshot of the node's current state.
///
/// Returned by [`NodeCommand::GetStatus`]. All fields are copied out of
/// the runtime so the reply is self-contained.
#[derive(Clone, Debug)]
pub struct NodeStatus {
    /// Current state machine state.
    pub state: NodeState,
    /// libp2p `PeerId` of this node.
    pub peer_id: PeerId,
    /// Addresses this node is currently listening on.
    pub listeners: Vec<Multiaddr>,
    /// Peers with at least one open connection, per the tracker.
    pub connected_peers: usize,
    /// Discovery phase, `None` for roles that do not discover.
    pub discovery: Option<DiscoveryPhase>,
    /// Joined topics, sorted.
    pub topics: Vec<String>,
}

// ---------------------------------------------------------------------------
// Request helper
// ---------------------------------------------------------------------------

/// Sends a command built around a fresh reply channel and waits for the
/// answer.
///
/// # Errors
///
/// Returns `QuotenetError::NodeError` if the event loop has exited or
/// dropped the reply without answering.
pub(crate) async fn request<T>(
    commands: &tokio::sync::mpsc::Sender<NodeCommand>,
    make: impl FnOnce(oneshot::Sender<T>) -> NodeCommand,
) -> QResult<T> {
    let (reply, rx) = oneshot::channel();
    commands
        .send(make(reply))
        .await
        .map_err(|_| QuotenetError::NodeError {
            reason: "node event loop is not running".into(),
        })?;
    rx.await.map_err(|_| QuotenetError::NodeError {
        reason: "node event loop dropped the request".into(),
    })
}
