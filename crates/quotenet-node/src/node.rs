//! Node lifecycle and state machine.
//!
//! The [`Node`] is the public entry point for the quotenet runtime. It
//! owns the swarm until [`Node::start`] moves it into the event loop
//! task, and from then on exposes a channel-based API.
//!
//! # State machine
//!
//! ```text
//! Initializing ──start()──▶ Running ──shutdown()──▶ ShuttingDown ──▶ (dropped)
//! ```
//!
//! Double-start and shutdown-from-initializing are rejected with
//! `QuotenetError::ConfigError`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use libp2p::identity::Keypair;
use libp2p::{Multiaddr, PeerId};
use quotenet_network::config::NetworkConfig;
use quotenet_network::events::NetworkEvent;
use quotenet_network::rendezvous::RendezvousKey;
use quotenet_network::swarm::QuotenetSwarm;
use quotenet_types::QuotenetError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::command::NodeCommand;
use crate::discovery::{DiscoveryConfig, PeerDiscovery};
use crate::event_loop;
use crate::events::NodeEvent;
use crate::pubsub::{InboundMessage, PubSubChannel};

/// Convenience alias.
type QResult<T> = std::result::Result<T, QuotenetError>;

// ---------------------------------------------------------------------------
// Channel buffer sizes
// ---------------------------------------------------------------------------

/// Bounded command channel capacity.
const COMMAND_CHANNEL_SIZE: usize = 256;

/// Bounded node event channel capacity.
const EVENT_CHANNEL_SIZE: usize = 1024;

/// Default maintenance tick interval (address pruning, relay renewal).
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// Lifecycle state of the node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Swarm created, event loop not started.
    Initializing,
    /// Event loop is active.
    Running,
    /// Shutdown signalled.
    ShuttingDown,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

// ---------------------------------------------------------------------------
// Role / options
// ---------------------------------------------------------------------------

/// What the node is for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeRole {
    /// Well-known entry point. Accepts `/bootstrap/1.0.0` streams and,
    /// with the relay server enabled, announces itself as a relay.
    Bootstrap,
    /// Quote participant. Runs rendezvous discovery for `topic`.
    Client { topic: String },
}

/// Everything [`Node::new`] needs besides the identity.
#[derive(Clone, Debug)]
pub struct NodeOptions {
    pub role: NodeRole,
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub maintenance_interval: Duration,
}

impl NodeOptions {
    /// Bootstrap node options. The bootstrap stream handler is always
    /// on for this role.
    pub fn bootstrap(network: NetworkConfig) -> Self {
        Self {
            role: NodeRole::Bootstrap,
            network: NetworkConfig {
                bootstrap_server: true,
                ..network
            },
            discovery: DiscoveryConfig::default(),
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }

    /// Client node options. The bootstrap barrier deadline follows
    /// `network.dial_timeout_secs`.
    pub fn client(topic: impl Into<String>, network: NetworkConfig) -> Self {
        let discovery = DiscoveryConfig {
            bootstrap_dial_timeout: Duration::from_secs(network.dial_timeout_secs),
            ..DiscoveryConfig::default()
        };
        Self {
            role: NodeRole::Client {
                topic: topic.into(),
            },
            network,
            discovery,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeRuntime (internal)
// ---------------------------------------------------------------------------

/// Owned runtime state moved into the event loop task.
pub(crate) struct NodeRuntime {
    pub network: QuotenetSwarm,
    pub network_rx: mpsc::UnboundedReceiver<NetworkEvent>,
    pub role: NodeRole,
    pub listen_addr: Multiaddr,
    pub discovery: Option<PeerDiscovery>,
    pub maintenance_interval: Duration,
    /// Joined topics and their local subscribers.
    pub topics: HashMap<String, Vec<mpsc::UnboundedSender<InboundMessage>>>,
    /// Bootstrap peers whose `/bootstrap/1.0.0` greeting was sent.
    pub greeted: HashSet<PeerId>,
    pub event_tx: mpsc::Sender<NodeEvent>,
    pub command_rx: mpsc::Receiver<NodeCommand>,
    pub shutdown_rx: watch::Receiver<bool>,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// quotenet node: owns the swarm and drives the event loop.
///
/// After construction via [`Node::new`], call [`Node::start`] to spawn
/// the event loop, then:
///
/// - Use topics through [`Node::pubsub`].
/// - Send [`NodeCommand`]s via [`Node::command_sender`].
/// - Receive [`NodeEvent`]s via [`Node::take_event_receiver`].
/// - Shut down via [`NodeCommand::Shutdown`] or [`Node::shutdown`].
pub struct Node {
    state: NodeState,
    peer_id: PeerId,
    runtime: Option<NodeRuntime>,
    command_tx: mpsc::Sender<NodeCommand>,
    event_rx: Option<mpsc::Receiver<NodeEvent>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Node {
    /// Creates a node with its swarm. Nothing listens until
    /// [`Node::start`].
    ///
    /// # Errors
    ///
    /// - `QuotenetError::ConfigError` for an invalid network config.
    /// - `QuotenetError::NetworkError` if swarm construction fails or
    ///   a configured bootstrap address lacks a `/p2p/` component.
    pub fn new(keypair: Keypair, options: NodeOptions) -> QResult<Self> {
        let NodeOptions {
            role,
            network: net_config,
            discovery: discovery_config,
            maintenance_interval,
        } = options;

        let listen_addr = net_config.listen_addr.clone();
        let bootstrap_nodes = net_config.effective_bootstrap_nodes();

        let (mut network, network_rx) = QuotenetSwarm::new(net_config, keypair)?;
        let peer_id = *network.local_peer_id();

        let bootstrap = network.add_bootstrap_nodes(&bootstrap_nodes)?;

        let discovery = match &role {
            NodeRole::Bootstrap => None,
            NodeRole::Client { topic } => Some(PeerDiscovery::new(
                peer_id,
                RendezvousKey::from_topic(topic),
                bootstrap,
                discovery_config,
            )),
        };

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runtime = NodeRuntime {
            network,
            network_rx,
            role,
            listen_addr,
            discovery,
            maintenance_interval,
            topics: HashMap::new(),
            greeted: HashSet::new(),
            event_tx,
            command_rx,
            shutdown_rx,
        };

        Ok(Self {
            state: NodeState::Initializing,
            peer_id,
            runtime: Some(runtime),
            command_tx,
            event_rx: Some(event_rx),
            shutdown_tx,
        })
    }

    /// Starts the event loop in a new tokio task.
    ///
    /// Transitions `Initializing → Running`. The returned handle
    /// resolves when the event loop exits.
    ///
    /// # Errors
    ///
    /// `QuotenetError::ConfigError` if the node is not in
    /// `Initializing` state.
    pub fn start(&mut self) -> QResult<JoinHandle<()>> {
        if self.state != NodeState::Initializing {
            return Err(QuotenetError::ConfigError {
                reason: format!(
                    "cannot start node in state '{}'; expected 'initializing'",
                    self.state,
                ),
            });
        }

        let runtime = self.runtime.take().ok_or_else(|| QuotenetError::ConfigError {
            reason: "runtime already consumed (double start?)".into(),
        })?;

        let handle = tokio::spawn(async move {
            event_loop::run_event_loop(runtime).await;
        });

        self.state = NodeState::Running;
        Ok(handle)
    }

    /// Signals the event loop to exit. Idempotent once running.
    ///
    /// Await the `JoinHandle` returned by [`start`](Self::start) to
    /// wait for completion.
    ///
    /// # Errors
    ///
    /// `QuotenetError::ConfigError` if the node was never started.
    pub fn shutdown(&mut self) -> QResult<()> {
        if self.state == NodeState::Initializing {
            return Err(QuotenetError::ConfigError {
                reason: "cannot shutdown a node that has not been started".into(),
            });
        }
        if self.state == NodeState::ShuttingDown {
            return Ok(());
        }

        self.state = NodeState::ShuttingDown;
        let _ = self.shutdown_tx.send(true);
        Ok(())
    }

    /// Receiver side of the shutdown signal, for loops that should stop
    /// together with the node.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Returns a sender for submitting commands to the node.
    pub fn command_sender(&self) -> mpsc::Sender<NodeCommand> {
        self.command_tx.clone()
    }

    /// Topic operations on this node.
    pub fn pubsub(&self) -> PubSubChannel {
        PubSubChannel::new(self.command_tx.clone())
    }

    /// Takes the event receiver (can only be called once).
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<NodeEvent>> {
        self.event_rx.take()
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> NetworkConfig {
        NetworkConfig {
            listen_addr: "/ip4/127.0.0.1/tcp/0".parse().unwrap(),
            include_default_bootstrap: false,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn state_display() {
        assert_eq!(NodeState::Initializing.to_string(), "initializing");
        assert_eq!(NodeState::Running.to_string(), "running");
        assert_eq!(NodeState::ShuttingDown.to_string(), "shutting_down");
    }

    #[test]
    fn bootstrap_options_enable_stream_handler() {
        let options = NodeOptions::bootstrap(local_config());
        assert!(options.network.bootstrap_server);
        assert_eq!(options.role, NodeRole::Bootstrap);
    }

    #[test]
    fn client_options_use_dial_timeout_for_barrier() {
        let options = NodeOptions::client(
            "fx-quotes",
            NetworkConfig {
                dial_timeout_secs: 7,
                ..local_config()
            },
        );
        assert_eq!(options.discovery.bootstrap_dial_timeout, Duration::from_secs(7));
        assert!(!options.network.bootstrap_server);
    }

    #[tokio::test]
    async fn lifecycle_rejects_out_of_order_calls() {
        let mut node = Node::new(
            Keypair::generate_ed25519(),
            NodeOptions::client("fx-quotes", local_config()),
        )
        .unwrap();
        assert_eq!(node.state(), NodeState::Initializing);
        assert!(matches!(
            node.shutdown(),
            Err(QuotenetError::ConfigError { .. })
        ));

        let handle = node.start().unwrap();
        assert_eq!(node.state(), NodeState::Running);
        assert!(node.start().is_err());

        node.shutdown().unwrap();
        node.shutdown().unwrap();
        assert_eq!(node.state(), NodeState::ShuttingDown);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn bootstrap_address_without_peer_id_is_rejected() {
        let config = NetworkConfig {
            bootstrap_nodes: vec!["/ip4/127.0.0.1/tcp/4001".parse().unwrap()],
            ..local_config()
        };
        let result = Node::new(
            Keypair::generate_ed25519(),
            NodeOptions::client("fx-quotes", config),
        );
        assert!(matches!(result, Err(QuotenetError::NetworkError { .. })));
    }

    #[tokio::test]
    async fn event_receiver_taken_once() {
        let mut node = Node::new(
            Keypair::generate_ed25519(),
            NodeOptions::bootstrap(local_config()),
        )
        .unwrap();
        assert!(node.take_event_receiver().is_some());
        assert!(node.take_event_receiver().is_none());
    }
}
