//! High-level swarm wrapper for the quotenet network.
//!
//! [`QuotenetSwarm`] owns the libp2p `Swarm` with the combined
//! [`QuotenetBehaviour`], the [`ConnectionTracker`] and the local
//! [`AddressBook`], and translates libp2p events into
//! [`NetworkEvent`]s for the node layer.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures::StreamExt;
use libp2p::gossipsub;
use libp2p::identity::Keypair;
use libp2p::relay;
use libp2p::request_response::{self, OutboundRequestId, ProtocolSupport};
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{DialError, NetworkBehaviour, SwarmEvent};
use libp2p::{identify, kad, noise, yamux, Multiaddr, PeerId, Swarm};
use tokio::sync::mpsc;

use quotenet_types::QuotenetError;

use crate::address_book::{AddressBook, LEARNED_ADDR_TTL};
use crate::config::NetworkConfig;
use crate::discovery::{build_discovery_behaviour, DiscoveryBehaviour, DiscoveryBehaviourEvent};
use crate::events::NetworkEvent;
use crate::gossip;
use crate::protocol::{BootstrapHello, BootstrapReply, BOOTSTRAP_PROTOCOL};
use crate::relay::{
    announce_relay, build_relay_server_behaviour, log_relay_client_event, log_relay_server_event,
    RelayAnnouncement,
};
use crate::rendezvous::RendezvousKey;
use crate::tracker::ConnectionTracker;
use crate::transport;

/// Convenience alias to avoid shadowing `std::result::Result`
/// which the `#[derive(NetworkBehaviour)]` macro requires.
type QResult<T> = std::result::Result<T, QuotenetError>;

/// How long an outbound bootstrap hello may wait for the stream to open.
const BOOTSTRAP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Combined behaviour
// ---------------------------------------------------------------------------

/// Combined libp2p behaviour for quotenet.
///
/// Composes:
/// - [`DiscoveryBehaviour`]: Kademlia DHT + Identify.
/// - `gossipsub::Behaviour`: topic pub/sub for quotes.
/// - `cbor::Behaviour<BootstrapHello, BootstrapReply>`: the
///   `/bootstrap/1.0.0` stream protocol.
/// - `Toggle<relay::Behaviour>`: circuit relay server, bootstrap role only.
/// - `relay::client::Behaviour`: reserves and dials relay circuits.
#[derive(NetworkBehaviour)]
pub struct QuotenetBehaviour {
    pub discovery: DiscoveryBehaviour,
    pub gossip: gossipsub::Behaviour,
    pub bootstrap: request_response::cbor::Behaviour<BootstrapHello, BootstrapReply>,
    pub relay_server: Toggle<relay::Behaviour>,
    pub relay_client: relay::client::Behaviour,
}

// ---------------------------------------------------------------------------
// Dial outcome
// ---------------------------------------------------------------------------

/// Immediate outcome of a dial request. The connection result itself
/// arrives later as [`NetworkEvent::PeerConnected`] or
/// [`NetworkEvent::DialFailed`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DialStart {
    /// A new dial was started.
    Started,
    /// The peer is already connected; no dial was made.
    AlreadyConnected,
    /// A dial to the peer is already in flight.
    Pending,
}

// ---------------------------------------------------------------------------
// QuotenetSwarm
// ---------------------------------------------------------------------------

/// High-level wrapper around `Swarm<QuotenetBehaviour>`.
///
/// # Usage
///
/// ```ignore
/// let (mut swarm, event_rx) = QuotenetSwarm::new(config, keypair)?;
/// swarm.start_listening("/ip4/0.0.0.0/tcp/0".parse()?)?;
/// loop {
///     swarm.poll_next().await;
/// }
/// ```
pub struct QuotenetSwarm {
    swarm: Swarm<QuotenetBehaviour>,
    config: NetworkConfig,
    event_sender: mpsc::UnboundedSender<NetworkEvent>,
    tracker: ConnectionTracker,
    /// Peers currently counted by the tracker.
    counted: HashSet<PeerId>,
    address_book: AddressBook,
    relay_announcement: Option<RelayAnnouncement>,
}

impl QuotenetSwarm {
    /// Creates a new swarm.
    ///
    /// Returns `(swarm, event_receiver)` where `event_receiver`
    /// delivers all [`NetworkEvent`]s to the caller.
    ///
    /// # Errors
    ///
    /// Returns `QuotenetError::ConfigError` for an invalid config and
    /// `QuotenetError::NetworkError` if transport or behaviour
    /// construction fails.
    pub fn new(
        config: NetworkConfig,
        keypair: Keypair,
    ) -> QResult<(Self, mpsc::UnboundedReceiver<NetworkEvent>)> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let config_clone = config.clone();
        let idle_timeout = Duration::from_secs(config.idle_timeout_secs);

        let swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                transport::tcp_config(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| QuotenetError::NetworkError {
                reason: format!("failed to configure TCP transport: {e}"),
            })?
            .with_quic()
            .with_dns()
            .map_err(|e| QuotenetError::NetworkError {
                reason: format!("failed to configure DNS transport: {e}"),
            })?
            .with_relay_client(noise::Config::new, yamux::Config::default)
            .map_err(|e| QuotenetError::NetworkError {
                reason: format!("failed to configure relay client transport: {e}"),
            })?
            .with_behaviour(|key, relay_client| {
                build_combined_behaviour(key, relay_client, &config_clone)
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .map_err(|e| QuotenetError::NetworkError {
                reason: format!("failed to build network behaviour: {e}"),
            })?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        let me = Self {
            swarm,
            config,
            event_sender: event_tx,
            tracker: ConnectionTracker::new(),
            counted: HashSet::new(),
            address_book: AddressBook::new(),
            relay_announcement: None,
        };

        Ok((me, event_rx))
    }

    /// Returns the local `PeerId` of this swarm.
    pub fn local_peer_id(&self) -> &PeerId {
        self.swarm.local_peer_id()
    }

    /// The configuration this swarm was built with.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// A handle to the shared connected-peer counter.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }

    // -----------------------------------------------------------------------
    // Listening
    // -----------------------------------------------------------------------

    /// Starts listening on the given multiaddr.
    ///
    /// # Errors
    ///
    /// Returns `QuotenetError::NetworkError` if the address is not
    /// supported by any transport.
    pub fn start_listening(&mut self, addr: Multiaddr) -> QResult<()> {
        self.swarm
            .listen_on(addr)
            .map_err(|e| QuotenetError::NetworkError {
                reason: format!("failed to start listening: {e}"),
            })?;
        Ok(())
    }

    /// Returns the list of addresses this swarm is currently listening on.
    pub fn listeners(&self) -> Vec<Multiaddr> {
        self.swarm.listeners().cloned().collect()
    }

    /// Returns the set of currently connected peer IDs.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.swarm.connected_peers().cloned().collect()
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.swarm.is_connected(peer_id)
    }

    // -----------------------------------------------------------------------
    // Dialing
    // -----------------------------------------------------------------------

    /// Dials `peer_id`, trying `addrs` first and then any address a
    /// behaviour knows (routing table, query results).
    ///
    /// # Errors
    ///
    /// Returns `QuotenetError::NetworkError` if the dial cannot be
    /// started (no usable address, dialing self, ...).
    pub fn dial_peer(&mut self, peer_id: PeerId, addrs: Vec<Multiaddr>) -> QResult<DialStart> {
        if peer_id == *self.swarm.local_peer_id() {
            return Err(QuotenetError::NetworkError {
                reason: "refusing to dial the local peer".into(),
            });
        }
        if self.swarm.is_connected(&peer_id) {
            return Ok(DialStart::AlreadyConnected);
        }

        let mut addrs = addrs;
        for known in self.address_book.addrs(&peer_id) {
            if !addrs.contains(&known) {
                addrs.push(known);
            }
        }

        let opts = DialOpts::peer_id(peer_id)
            .addresses(addrs)
            .condition(PeerCondition::DisconnectedAndNotDialing)
            .extend_addresses_through_behaviour()
            .build();

        match self.swarm.dial(opts) {
            Ok(()) => {
                tracing::debug!(%peer_id, "dialing peer");
                Ok(DialStart::Started)
            }
            Err(DialError::DialPeerConditionFalse(_)) => {
                if self.swarm.is_connected(&peer_id) {
                    Ok(DialStart::AlreadyConnected)
                } else {
                    Ok(DialStart::Pending)
                }
            }
            Err(e) => Err(QuotenetError::NetworkError {
                reason: format!("failed to dial peer {peer_id}: {e}"),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Discovery (DHT)
    // -----------------------------------------------------------------------

    /// Adds bootstrap nodes to the Kademlia routing table. Returns the
    /// `(PeerId, address)` pairs that carried a peer id.
    pub fn add_bootstrap_nodes(&mut self, nodes: &[Multiaddr]) -> QResult<Vec<(PeerId, Multiaddr)>> {
        self.swarm
            .behaviour_mut()
            .discovery
            .add_bootstrap_nodes(nodes)
    }

    /// Starts a Kademlia bootstrap (self lookup).
    pub fn kad_bootstrap(&mut self) -> QResult<kad::QueryId> {
        self.swarm.behaviour_mut().discovery.bootstrap()
    }

    /// Advertises this node under `key`.
    pub fn start_providing(&mut self, key: &RendezvousKey) -> QResult<kad::QueryId> {
        self.swarm.behaviour_mut().discovery.start_providing(key)
    }

    /// Starts a provider lookup for `key`.
    pub fn get_providers(&mut self, key: &RendezvousKey) -> kad::QueryId {
        self.swarm.behaviour_mut().discovery.get_providers(key)
    }

    // -----------------------------------------------------------------------
    // Gossip
    // -----------------------------------------------------------------------

    /// Subscribes to a topic. `Ok(false)` if already subscribed.
    pub fn join_topic(&mut self, topic: &str) -> QResult<bool> {
        gossip::join(&mut self.swarm.behaviour_mut().gossip, topic)
    }

    /// Unsubscribes from a topic. `false` if not subscribed.
    pub fn leave_topic(&mut self, topic: &str) -> bool {
        gossip::leave(&mut self.swarm.behaviour_mut().gossip, topic)
    }

    /// Publishes raw bytes to a topic.
    pub fn publish(&mut self, topic: &str, data: Vec<u8>) -> QResult<()> {
        let message_id = gossip::publish(&mut self.swarm.behaviour_mut().gossip, topic, data)?;
        tracing::debug!(%topic, %message_id, "gossip message published");
        Ok(())
    }

    /// Number of peers known to be subscribed to `topic`.
    pub fn topic_peer_count(&self, topic: &str) -> usize {
        let hash = gossip::topic(topic).hash();
        self.swarm
            .behaviour()
            .gossip
            .all_peers()
            .filter(|(_, topics)| topics.contains(&&hash))
            .count()
    }

    // -----------------------------------------------------------------------
    // Relay
    // -----------------------------------------------------------------------

    /// Registers this node as reachable via `/p2p-circuit` for
    /// 24 hours. No-op (returns `None`) unless the relay server is
    /// enabled.
    pub fn announce_relay(&mut self) -> Option<RelayAnnouncement> {
        if !self.config.enable_relay_server {
            return None;
        }
        let local = *self.swarm.local_peer_id();
        let announcement = announce_relay(&mut self.address_book, local);
        self.relay_announcement = Some(announcement.clone());
        Some(announcement)
    }

    pub fn relay_announcement(&self) -> Option<&RelayAnnouncement> {
        self.relay_announcement.as_ref()
    }

    /// Periodic housekeeping: drops expired address-book entries and,
    /// when renewal is enabled, re-announces the relay address before
    /// it lapses. Returns the new announcement if one was made.
    pub fn maintain(&mut self, now: Instant) -> Option<RelayAnnouncement> {
        let pruned = self.address_book.prune(now);
        if pruned > 0 {
            tracing::debug!(pruned, "pruned expired addresses");
        }

        if !self.config.relay_announce_renewal {
            return None;
        }
        let due = self
            .relay_announcement
            .as_ref()
            .is_some_and(|a| a.needs_renewal(now));
        if due {
            tracing::info!("relay announcement close to expiry, renewing");
            return self.announce_relay();
        }
        None
    }

    // -----------------------------------------------------------------------
    // Bootstrap stream protocol
    // -----------------------------------------------------------------------

    /// Opens a `/bootstrap/1.0.0` stream to `peer_id` and sends a hello.
    pub fn open_bootstrap_stream(&mut self, peer_id: &PeerId) -> OutboundRequestId {
        self.swarm
            .behaviour_mut()
            .bootstrap
            .send_request(peer_id, BootstrapHello::new())
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Processes a single swarm event.
    ///
    /// Designed for use inside `tokio::select!` where the caller needs
    /// to multiplex swarm events with other async sources (commands,
    /// timers, shutdown signals). Each call drives the libp2p swarm
    /// forward by one event.
    pub async fn poll_next(&mut self) {
        let event = self.swarm.select_next_some().await;
        self.handle_swarm_event(event);
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<QuotenetBehaviourEvent>) {
        match event {
            // --- Connection events ------------------------------------
            SwarmEvent::NewListenAddr {
                listener_id,
                address,
            } => {
                let local = *self.swarm.local_peer_id();
                tracing::info!(?listener_id, "listening on {address}/p2p/{local}");
                if self.config.advertise_listen_addrs {
                    self.swarm.add_external_address(address.clone());
                }
                self.emit(NetworkEvent::Listening(address));
            }

            SwarmEvent::ExpiredListenAddr { address, .. } => {
                tracing::info!(%address, "listen address expired");
                self.swarm.remove_external_address(&address);
            }

            // The tracker counts peers, not connections: only the first
            // connection to a peer is counted, and only the last close
            // uncounts it. A peer refused by the connection limit is never
            // counted and is reported as a failed dial.
            SwarmEvent::ConnectionEstablished {
                peer_id,
                endpoint,
                num_established,
                ..
            } => {
                tracing::debug!(
                    %peer_id,
                    ?endpoint,
                    num_established,
                    "connection established"
                );
                if num_established.get() != 1 {
                    return;
                }
                if self.counted.len() >= self.config.max_connections {
                    tracing::warn!(
                        %peer_id,
                        max_connections = self.config.max_connections,
                        "connection limit reached, disconnecting peer"
                    );
                    if self.swarm.disconnect_peer_id(peer_id).is_err() {
                        tracing::debug!(%peer_id, "peer already disconnected");
                    }
                    self.emit(NetworkEvent::DialFailed {
                        peer_id: Some(peer_id),
                        reason: "connection limit reached".into(),
                    });
                    return;
                }
                self.counted.insert(peer_id);
                self.tracker.on_connected(&peer_id);
                self.emit(NetworkEvent::PeerConnected(peer_id));
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                tracing::debug!(%peer_id, ?cause, num_established, "connection closed");
                if num_established == 0 && self.counted.remove(&peer_id) {
                    self.tracker.on_disconnected(&peer_id);
                    self.emit(NetworkEvent::PeerDisconnected(peer_id));
                }
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                tracing::warn!(?peer_id, %error, "outgoing connection error");
                self.emit(NetworkEvent::DialFailed {
                    peer_id,
                    reason: error.to_string(),
                });
            }

            SwarmEvent::IncomingConnectionError {
                local_addr,
                send_back_addr,
                error,
                ..
            } => {
                tracing::warn!(
                    %local_addr,
                    %send_back_addr,
                    %error,
                    "incoming connection error"
                );
            }

            // --- Behaviour events -------------------------------------
            SwarmEvent::Behaviour(event) => {
                self.handle_behaviour_event(event);
            }

            // --- Catch-all --------------------------------------------
            other => {
                tracing::trace!(?other, "unhandled swarm event");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal event dispatch
    // -----------------------------------------------------------------------

    fn handle_behaviour_event(&mut self, event: QuotenetBehaviourEvent) {
        match event {
            QuotenetBehaviourEvent::Discovery(DiscoveryBehaviourEvent::Kademlia(kad_event)) => {
                self.handle_kademlia_event(kad_event);
            }
            QuotenetBehaviourEvent::Discovery(DiscoveryBehaviourEvent::Identify(id_event)) => {
                self.handle_identify_event(id_event);
            }
            QuotenetBehaviourEvent::Gossip(gossip_event) => {
                self.handle_gossip_event(gossip_event);
            }
            QuotenetBehaviourEvent::Bootstrap(rr_event) => {
                self.handle_bootstrap_event(rr_event);
            }
            QuotenetBehaviourEvent::RelayServer(event) => {
                log_relay_server_event(&event);
            }
            QuotenetBehaviourEvent::RelayClient(event) => {
                log_relay_client_event(&event);
            }
        }
    }

    fn handle_kademlia_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::OutboundQueryProgressed {
                id, result, step, ..
            } => match result {
                kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders {
                    providers,
                    ..
                })) => {
                    let providers: Vec<PeerId> = providers.into_iter().collect();
                    tracing::debug!(?id, count = providers.len(), "DHT providers found");
                    self.emit(NetworkEvent::ProvidersFound {
                        query_id: id,
                        providers,
                    });
                    if step.last {
                        self.emit(NetworkEvent::ProviderQueryFinished { query_id: id });
                    }
                }
                kad::QueryResult::GetProviders(Ok(
                    kad::GetProvidersOk::FinishedWithNoAdditionalRecord { .. },
                )) => {
                    tracing::debug!(?id, "DHT provider query finished");
                    self.emit(NetworkEvent::ProviderQueryFinished { query_id: id });
                }
                kad::QueryResult::GetProviders(Err(e)) => {
                    tracing::warn!(?id, ?e, "DHT provider query failed");
                    self.emit(NetworkEvent::ProviderQueryFailed {
                        query_id: id,
                        reason: e.to_string(),
                    });
                }
                kad::QueryResult::StartProviding(Ok(kad::AddProviderOk { key })) => {
                    tracing::info!(?id, ?key, "rendezvous advertisement replicated");
                }
                kad::QueryResult::StartProviding(Err(e)) => {
                    tracing::warn!(?id, ?e, "rendezvous advertisement not replicated");
                }
                kad::QueryResult::Bootstrap(Ok(kad::BootstrapOk {
                    peer,
                    num_remaining,
                })) => {
                    tracing::debug!(?id, %peer, num_remaining, "Kademlia bootstrap progress");
                }
                kad::QueryResult::Bootstrap(Err(e)) => {
                    tracing::warn!(?id, ?e, "Kademlia bootstrap failed");
                }
                other => {
                    tracing::trace!(?id, ?step, ?other, "other Kademlia query result");
                }
            },
            kad::Event::RoutingUpdated {
                peer, addresses, ..
            } => {
                tracing::debug!(%peer, ?addresses, "Kademlia routing table updated");
            }
            kad::Event::InboundRequest { request } => {
                tracing::trace!(?request, "Kademlia inbound request");
            }
            other => {
                tracing::trace!(?other, "other Kademlia event");
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                tracing::debug!(
                    %peer_id,
                    agent_version = %info.agent_version,
                    listen_addrs = ?info.listen_addrs,
                    "identify: received peer info"
                );

                let speaks_kad = info
                    .protocols
                    .iter()
                    .any(|p| p.as_ref() == self.config.kad_protocol.as_str());
                if speaks_kad {
                    for addr in &info.listen_addrs {
                        self.swarm
                            .behaviour_mut()
                            .discovery
                            .add_address(&peer_id, addr.clone());
                    }
                }

                self.address_book
                    .add_addrs(peer_id, info.listen_addrs, LEARNED_ADDR_TTL);
            }
            identify::Event::Sent { peer_id, .. } => {
                tracing::trace!(%peer_id, "identify: sent our info to peer");
            }
            identify::Event::Pushed { peer_id, .. } => {
                tracing::trace!(%peer_id, "identify: pushed info update to peer");
            }
            identify::Event::Error { peer_id, error, .. } => {
                tracing::debug!(%peer_id, %error, "identify: error");
            }
        }
    }

    fn handle_gossip_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            } => {
                self.emit(NetworkEvent::GossipMessage {
                    source: propagation_source,
                    topic: message.topic.to_string(),
                    data: message.data,
                });
            }
            gossipsub::Event::Subscribed { peer_id, topic } => {
                tracing::debug!(%peer_id, %topic, "peer subscribed to topic");
            }
            gossipsub::Event::Unsubscribed { peer_id, topic } => {
                tracing::debug!(%peer_id, %topic, "peer unsubscribed from topic");
            }
            other => {
                tracing::trace!(?other, "other gossipsub event");
            }
        }
    }

    fn handle_bootstrap_event(
        &mut self,
        event: request_response::Event<BootstrapHello, BootstrapReply>,
    ) {
        match event {
            request_response::Event::Message {
                peer,
                message: request_response::Message::Request {
                    request, channel, ..
                },
                ..
            } => {
                tracing::info!(
                    peer_id = %peer,
                    agent = %request.agent,
                    connected = self.tracker.count(),
                    "new client opened bootstrap stream"
                );
                // Dropping the channel closes the stream without a reply.
                drop(channel);
                self.emit(NetworkEvent::InboundBootstrapStream { peer_id: peer });
            }
            request_response::Event::Message {
                peer,
                message: request_response::Message::Response { .. },
                ..
            } => {
                tracing::debug!(%peer, "unexpected bootstrap reply");
            }
            request_response::Event::OutboundFailure { peer, error, .. } => {
                tracing::debug!(%peer, %error, "bootstrap stream closed");
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                tracing::trace!(%peer, %error, "bootstrap stream closed without reply");
            }
            request_response::Event::ResponseSent { peer, .. } => {
                tracing::trace!(%peer, "bootstrap reply sent");
            }
        }
    }

    fn emit(&self, event: NetworkEvent) {
        if self.event_sender.send(event).is_err() {
            tracing::trace!("network event receiver dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Behaviour construction
// ---------------------------------------------------------------------------

/// Builds the combined [`QuotenetBehaviour`].
fn build_combined_behaviour(
    key: &Keypair,
    relay_client: relay::client::Behaviour,
    config: &NetworkConfig,
) -> QResult<QuotenetBehaviour> {
    let local_peer_id = PeerId::from(key.public());

    let discovery = build_discovery_behaviour(key, config)?;
    let gossip = gossip::build_gossip_behaviour(key, config)?;

    let support = if config.bootstrap_server {
        ProtocolSupport::Full
    } else {
        ProtocolSupport::Outbound
    };
    let bootstrap = request_response::cbor::Behaviour::<BootstrapHello, BootstrapReply>::new(
        [(BOOTSTRAP_PROTOCOL, support)],
        request_response::Config::default().with_request_timeout(BOOTSTRAP_REQUEST_TIMEOUT),
    );

    let relay_server =
        Toggle::from(build_relay_server_behaviour(local_peer_id, config.enable_relay_server));

    Ok(QuotenetBehaviour {
        discovery,
        gossip,
        bootstrap,
        relay_server,
        relay_client,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> NetworkConfig {
        NetworkConfig {
            listen_addr: "/ip4/127.0.0.1/tcp/0".parse().unwrap(),
            include_default_bootstrap: false,
            ..NetworkConfig::default()
        }
    }

    #[tokio::test]
    async fn swarm_builds_with_default_config() {
        let keypair = Keypair::generate_ed25519();
        let expected = PeerId::from(keypair.public());
        let (swarm, _rx) = QuotenetSwarm::new(test_config(), keypair).unwrap();
        assert_eq!(*swarm.local_peer_id(), expected);
        assert_eq!(swarm.tracker().count(), 0);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = NetworkConfig {
            idle_timeout_secs: 0,
            ..test_config()
        };
        let result = QuotenetSwarm::new(config, Keypair::generate_ed25519());
        assert!(matches!(result, Err(QuotenetError::ConfigError { .. })));
    }

    #[tokio::test]
    async fn relay_announcement_requires_relay_server() {
        let (mut swarm, _rx) =
            QuotenetSwarm::new(test_config(), Keypair::generate_ed25519()).unwrap();
        assert!(swarm.announce_relay().is_none());
        assert!(swarm.relay_announcement().is_none());
    }

    #[tokio::test]
    async fn relay_announcement_recorded_in_address_book() {
        let config = NetworkConfig {
            enable_relay_server: true,
            ..test_config()
        };
        let (mut swarm, _rx) = QuotenetSwarm::new(config, Keypair::generate_ed25519()).unwrap();
        let local = *swarm.local_peer_id();

        let ann = swarm.announce_relay().unwrap();
        assert_eq!(ann.peer_id, local);
        assert_eq!(ann.ttl(), Duration::from_secs(24 * 3600));
        assert_eq!(swarm.address_book().addrs(&local), vec![ann.addr.clone()]);
    }

    #[tokio::test]
    async fn maintain_renews_only_when_enabled_and_due() {
        let config = NetworkConfig {
            enable_relay_server: true,
            relay_announce_renewal: true,
            ..test_config()
        };
        let (mut swarm, _rx) = QuotenetSwarm::new(config, Keypair::generate_ed25519()).unwrap();
        let first = swarm.announce_relay().unwrap();

        assert!(swarm.maintain(first.registered_at).is_none());

        let late = first.renew_at() + Duration::from_secs(1);
        let renewed = swarm.maintain(late).unwrap();
        assert!(renewed.expires_at >= first.expires_at);
    }

    #[tokio::test]
    async fn publish_without_subscribers_fails() {
        let (mut swarm, _rx) =
            QuotenetSwarm::new(test_config(), Keypair::generate_ed25519()).unwrap();
        assert!(swarm.join_topic("fx-quotes").unwrap());
        assert!(!swarm.join_topic("fx-quotes").unwrap());
        assert_eq!(swarm.topic_peer_count("fx-quotes"), 0);

        let err = swarm.publish("fx-quotes", b"{}".to_vec()).unwrap_err();
        assert!(matches!(err, QuotenetError::PublishError { .. }));
    }

    #[tokio::test]
    async fn dialing_self_is_an_error() {
        let (mut swarm, _rx) =
            QuotenetSwarm::new(test_config(), Keypair::generate_ed25519()).unwrap();
        let local = *swarm.local_peer_id();
        let addr: Multiaddr = "/ip4/127.0.0.1/tcp/1".parse().unwrap();
        assert!(swarm.dial_peer(local, vec![addr]).is_err());
    }
}
