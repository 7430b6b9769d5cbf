//! Main event loop driving the node.
//!
//! [`run_event_loop`] is spawned as a tokio task by [`Node::start`].
//! It uses `tokio::select!` to multiplex:
//!
//! 1. **Network swarm**: `poll_next()` drives libp2p event processing.
//! 2. **Network events**: connections, dial failures, provider query
//!    progress and gossip messages emitted by the swarm.
//! 3. **Commands**: dial, topic and status requests.
//! 4. **Discovery timers**: the bootstrap barrier deadline and the
//!    search retry delay.
//! 5. **Maintenance tick**: address pruning and relay renewal.
//! 6. **Shutdown signal**: graceful exit via `watch` channel.
//!
//! [`Node::start`]: crate::node::Node::start

use std::collections::VecDeque;

use libp2p::multiaddr::Protocol;
use libp2p::PeerId;
use quotenet_network::events::NetworkEvent;
use quotenet_network::swarm::DialStart;
use quotenet_types::QuotenetError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};

use crate::command::{NodeCommand, NodeStatus};
use crate::discovery::{DiscoveryAction, PeerDiscovery};
use crate::events::NodeEvent;
use crate::node::{NodeRole, NodeRuntime, NodeState};
use crate::pubsub::{InboundMessage, Subscription};

/// Pending discovery deadlines. Recreated as sleeps on every loop
/// iteration, so only the instants are stored.
#[derive(Debug, Default)]
struct DiscoveryTimers {
    bootstrap_deadline: Option<Instant>,
    retry_at: Option<Instant>,
}

// ---------------------------------------------------------------------------
// Event loop entry point
// ---------------------------------------------------------------------------

/// Runs the node event loop until shutdown is signalled.
pub(crate) async fn run_event_loop(mut rt: NodeRuntime) {
    tracing::info!(role = ?rt.role, peer_id = %rt.network.local_peer_id(), "node event loop started");

    let mut maintenance_tick = tokio::time::interval(rt.maintenance_interval);
    maintenance_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut timers = DiscoveryTimers::default();

    if let Err(e) = rt.network.start_listening(rt.listen_addr.clone()) {
        tracing::error!(%e, "failed to start listening -- continuing without listener");
    }

    match &rt.role {
        NodeRole::Bootstrap => {
            if let Some(announcement) = rt.network.announce_relay() {
                tracing::info!(ttl = ?announcement.ttl(), "relay address registered");
            }
        }
        NodeRole::Client { topic } => {
            tracing::info!(%topic, "starting peer discovery");
            drive_discovery(&mut rt, &mut timers, |d| d.start());
        }
    }

    loop {
        let bootstrap_deadline = timers.bootstrap_deadline;
        let retry_at = timers.retry_at;

        tokio::select! {
            // ---------------------------------------------------------------
            // 1. Drive the network swarm (process one libp2p event).
            // ---------------------------------------------------------------
            _ = rt.network.poll_next() => {
                // Events are dispatched internally by the swarm and
                // emitted to network_rx.
            }

            // ---------------------------------------------------------------
            // 2. Process network events emitted by the swarm.
            // ---------------------------------------------------------------
            Some(net_event) = rt.network_rx.recv() => {
                handle_network_event(net_event, &mut rt, &mut timers);
            }

            // ---------------------------------------------------------------
            // 3. Process commands.
            // ---------------------------------------------------------------
            Some(cmd) = rt.command_rx.recv() => {
                if handle_command(cmd, &mut rt) {
                    tracing::info!("shutdown command received -- exiting event loop");
                    break;
                }
            }

            // ---------------------------------------------------------------
            // 4. Discovery timers.
            // ---------------------------------------------------------------
            _ = sleep_until_opt(bootstrap_deadline) => {
                timers.bootstrap_deadline = None;
                drive_discovery(&mut rt, &mut timers, |d| d.on_bootstrap_deadline());
            }

            _ = sleep_until_opt(retry_at) => {
                timers.retry_at = None;
                drive_discovery(&mut rt, &mut timers, |d| d.on_retry_timer());
            }

            // ---------------------------------------------------------------
            // 5. Maintenance tick.
            // ---------------------------------------------------------------
            _ = maintenance_tick.tick() => {
                handle_maintenance(&mut rt);
            }

            // ---------------------------------------------------------------
            // 6. Shutdown signal.
            // ---------------------------------------------------------------
            result = rt.shutdown_rx.changed() => {
                if result.is_err() || *rt.shutdown_rx.borrow() {
                    tracing::info!("shutdown signal received -- exiting event loop");
                    break;
                }
            }
        }
    }

    // Dropping the senders ends every open subscription.
    rt.topics.clear();
    tracing::info!("node event loop exited");
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Best-effort delivery to the node's consumer; never blocks the loop.
fn emit(event_tx: &mpsc::Sender<NodeEvent>, event: NodeEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            tracing::warn!(?event, "node event channel full, dropping event");
        }
        Err(TrySendError::Closed(_)) => {
            tracing::trace!("node event receiver dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Network event handler
// ---------------------------------------------------------------------------

fn handle_network_event(event: NetworkEvent, rt: &mut NodeRuntime, timers: &mut DiscoveryTimers) {
    match event {
        NetworkEvent::Listening(addr) => {
            let full = addr.with(Protocol::P2p(*rt.network.local_peer_id()));
            if rt.role == NodeRole::Bootstrap {
                tracing::info!("bootstrap node listening on {full}");
            }
            emit(&rt.event_tx, NodeEvent::Listening(full));
        }

        NetworkEvent::PeerConnected(peer_id) => {
            if rt.role == NodeRole::Bootstrap {
                tracing::info!(
                    %peer_id,
                    connected_peers = rt.network.tracker().count(),
                    "client connected"
                );
            }
            emit(&rt.event_tx, NodeEvent::PeerConnected(peer_id));
            drive_discovery(rt, timers, |d| d.on_dial_succeeded(peer_id));
        }

        NetworkEvent::PeerDisconnected(peer_id) => {
            if rt.role == NodeRole::Bootstrap {
                tracing::info!(
                    %peer_id,
                    connected_peers = rt.network.tracker().count(),
                    "client disconnected"
                );
            }
            rt.greeted.remove(&peer_id);
            emit(&rt.event_tx, NodeEvent::PeerDisconnected(peer_id));
            drive_discovery(rt, timers, |d| d.on_peer_disconnected(peer_id));
        }

        NetworkEvent::DialFailed {
            peer_id: Some(peer_id),
            reason,
        } => {
            drive_discovery(rt, timers, |d| d.on_dial_failed(peer_id, &reason));
        }

        NetworkEvent::DialFailed { peer_id: None, .. } => {}

        NetworkEvent::ProvidersFound {
            query_id,
            providers,
        } => {
            drive_discovery(rt, timers, |d| d.on_providers(query_id, &providers));
        }

        NetworkEvent::ProviderQueryFinished { query_id } => {
            drive_discovery(rt, timers, |d| d.on_query_finished(query_id));
        }

        NetworkEvent::ProviderQueryFailed { query_id, reason } => {
            drive_discovery(rt, timers, |d| d.on_query_failed(query_id, &reason));
        }

        NetworkEvent::GossipMessage {
            source,
            topic,
            data,
        } => {
            deliver_gossip(rt, source, topic, data);
        }

        NetworkEvent::InboundBootstrapStream { peer_id } => {
            tracing::debug!(%peer_id, "bootstrap stream handled");
        }
    }
}

/// Fans a gossip message out to every live subscription on its topic.
fn deliver_gossip(rt: &mut NodeRuntime, source: PeerId, topic: String, data: Vec<u8>) {
    let Some(subscribers) = rt.topics.get_mut(&topic) else {
        tracing::trace!(%topic, "gossip for a topic that is not joined");
        return;
    };

    let message = InboundMessage {
        source,
        topic,
        data,
    };
    subscribers.retain(|tx| tx.send(message.clone()).is_ok());
    tracing::debug!(
        %source,
        topic = %message.topic,
        subscribers = subscribers.len(),
        "gossip message delivered"
    );
}

// ---------------------------------------------------------------------------
// Discovery driver
// ---------------------------------------------------------------------------

/// Feeds one outcome into the discovery state machine (if this node
/// runs one) and executes the resulting actions.
fn drive_discovery<F>(rt: &mut NodeRuntime, timers: &mut DiscoveryTimers, step: F)
where
    F: FnOnce(&mut PeerDiscovery) -> Vec<DiscoveryAction>,
{
    let Some(discovery) = rt.discovery.as_mut() else {
        return;
    };
    let mut queue: VecDeque<DiscoveryAction> = step(discovery).into();

    while let Some(action) = queue.pop_front() {
        match action {
            DiscoveryAction::Dial { peer_id, addrs } => {
                match rt.network.dial_peer(peer_id, addrs) {
                    Ok(DialStart::Started) | Ok(DialStart::Pending) => {}
                    Ok(DialStart::AlreadyConnected) => {
                        queue.extend(discovery.on_dial_succeeded(peer_id));
                    }
                    Err(e) => {
                        queue.extend(discovery.on_dial_failed(peer_id, &e.to_string()));
                    }
                }
            }

            DiscoveryAction::Greet { peer_id } => {
                if rt.greeted.insert(peer_id) {
                    let request_id = rt.network.open_bootstrap_stream(&peer_id);
                    tracing::debug!(%peer_id, ?request_id, "opened bootstrap stream");
                }
            }

            DiscoveryAction::ScheduleBootstrapDeadline(after) => {
                timers.bootstrap_deadline = Some(Instant::now() + after);
            }

            DiscoveryAction::KadBootstrap => {
                timers.bootstrap_deadline = None;
                match rt.network.kad_bootstrap() {
                    Ok(query_id) => tracing::info!(?query_id, "Kademlia bootstrap initiated"),
                    Err(e) => tracing::warn!(%e, "Kademlia bootstrap not started"),
                }
            }

            DiscoveryAction::Advertise => {
                if let Err(e) = rt.network.start_providing(discovery.key()) {
                    tracing::warn!(%e, "advertisement refused");
                }
                queue.extend(discovery.on_advertised());
            }

            DiscoveryAction::QueryProviders => {
                let query_id = rt.network.get_providers(discovery.key());
                tracing::debug!(?query_id, round = discovery.round(), "provider query started");
                discovery.on_query_started(query_id);
            }

            DiscoveryAction::ScheduleRetry(after) => {
                timers.retry_at = Some(Instant::now() + after);
            }

            DiscoveryAction::Completed { peer_id } => {
                tracing::info!(%peer_id, "peer discovery complete");
                emit(&rt.event_tx, NodeEvent::DiscoveryCompleted { peer_id });
            }

            DiscoveryAction::Failed { reason } => {
                tracing::error!(%reason, "peer discovery failed");
                timers.retry_at = None;
                emit(&rt.event_tx, NodeEvent::DiscoveryFailed { reason });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command handler
// ---------------------------------------------------------------------------

/// Handles one command. Returns `true` if the loop should exit.
fn handle_command(cmd: NodeCommand, rt: &mut NodeRuntime) -> bool {
    tracing::trace!(?cmd, "command received");

    match cmd {
        NodeCommand::Dial {
            peer_id,
            addrs,
            reply,
        } => {
            tracing::info!(%peer_id, "manual peer dial requested");
            let _ = reply.send(rt.network.dial_peer(peer_id, addrs));
        }

        NodeCommand::JoinTopic { topic, reply } => {
            let result = rt.network.join_topic(&topic).map(|fresh| {
                rt.topics.entry(topic).or_default();
                fresh
            });
            let _ = reply.send(result);
        }

        NodeCommand::LeaveTopic { topic, reply } => {
            let had_subscribers = rt.topics.remove(&topic).is_some();
            let left = rt.network.leave_topic(&topic);
            let _ = reply.send(Ok(had_subscribers || left));
        }

        NodeCommand::Publish { topic, data, reply } => {
            let result = if rt.topics.contains_key(&topic) {
                rt.network.publish(&topic, data)
            } else {
                Err(QuotenetError::PublishError {
                    reason: format!("topic '{topic}' is not joined"),
                })
            };
            let _ = reply.send(result);
        }

        NodeCommand::Subscribe { topic, reply } => {
            let result = match rt.topics.get_mut(&topic) {
                Some(subscribers) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    subscribers.push(tx);
                    tracing::debug!(%topic, count = subscribers.len(), "subscription opened");
                    Ok(Subscription::new(topic, rx))
                }
                None => Err(QuotenetError::NodeError {
                    reason: format!("cannot subscribe: topic '{topic}' is not joined"),
                }),
            };
            let _ = reply.send(result);
        }

        NodeCommand::GetStatus { reply } => {
            let _ = reply.send(build_status(rt));
        }

        NodeCommand::Shutdown => return true,
    }

    false
}

fn build_status(rt: &NodeRuntime) -> NodeStatus {
    let mut topics: Vec<String> = rt.topics.keys().cloned().collect();
    topics.sort();

    NodeStatus {
        state: NodeState::Running,
        peer_id: *rt.network.local_peer_id(),
        listeners: rt.network.listeners(),
        connected_peers: rt.network.tracker().count(),
        discovery: rt.discovery.as_ref().map(|d| d.phase()),
        topics,
    }
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

fn handle_maintenance(rt: &mut NodeRuntime) {
    if let Some(announcement) = rt.network.maintain(std::time::Instant::now()) {
        tracing::info!(ttl = ?announcement.ttl(), "relay address renewed");
    }
    tracing::debug!(
        connected_peers = rt.network.tracker().count(),
        "maintenance tick"
    );
}
