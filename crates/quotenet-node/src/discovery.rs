//! Rendezvous peer discovery as a sans-IO state machine.
//!
//! ```text
//! Bootstrapping ──barrier──▶ Advertising ──▶ Searching ──dial ok──▶ Connected
//!                                             │    ▲
//!                                             │    └── retry after search_interval
//!                                             └── query error / round cap ──▶ Failed
//! ```
//!
//! [`PeerDiscovery`] never touches the network. The event loop feeds it
//! outcomes (dial results, provider query progress, timers) and executes
//! the [`DiscoveryAction`]s it returns. The query identifier is a type
//! parameter so the machine can be driven with plain integers in tests.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use libp2p::kad::QueryId;
use libp2p::{Multiaddr, PeerId};
use quotenet_network::rendezvous::RendezvousKey;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Delay between two search rounds.
pub const DEFAULT_SEARCH_INTERVAL: Duration = Duration::from_secs(5);

/// How long the bootstrap barrier waits for outstanding dials.
pub const DEFAULT_BOOTSTRAP_DIAL_TIMEOUT: Duration = Duration::from_secs(20);

/// Tuning knobs for [`PeerDiscovery`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveryConfig {
    /// Fixed delay between search rounds.
    pub search_interval: Duration,
    /// Give up after this many rounds. `None` searches forever.
    pub max_search_rounds: Option<u32>,
    /// Re-enter searching when the connected topic peer goes away.
    pub rediscover_on_disconnect: bool,
    /// Upper bound on the bootstrap barrier.
    pub bootstrap_dial_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_interval: DEFAULT_SEARCH_INTERVAL,
            max_search_rounds: None,
            rediscover_on_disconnect: false,
            bootstrap_dial_timeout: DEFAULT_BOOTSTRAP_DIAL_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase / actions
// ---------------------------------------------------------------------------

/// Externally visible discovery phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiscoveryPhase {
    /// Created, `start()` not called yet.
    Idle,
    /// Dialing the bootstrap set.
    Bootstrapping,
    /// Waiting for the advertisement to be placed.
    Advertising,
    /// Querying providers, or waiting for the next round.
    Searching,
    /// A topic peer was reached.
    Connected,
    /// The provider query failed or the round cap was hit.
    Failed,
}

impl fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Bootstrapping => write!(f, "bootstrapping"),
            Self::Advertising => write!(f, "advertising"),
            Self::Searching => write!(f, "searching"),
            Self::Connected => write!(f, "connected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Work the event loop must carry out on behalf of [`PeerDiscovery`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DiscoveryAction {
    /// Dial `peer_id`, trying `addrs` first. Report the outcome through
    /// [`PeerDiscovery::on_dial_succeeded`] or
    /// [`PeerDiscovery::on_dial_failed`].
    Dial { peer_id: PeerId, addrs: Vec<Multiaddr> },
    /// Open a `/bootstrap/1.0.0` stream to a reached bootstrap peer.
    Greet { peer_id: PeerId },
    /// Call [`PeerDiscovery::on_bootstrap_deadline`] after this delay.
    ScheduleBootstrapDeadline(Duration),
    /// Start a Kademlia bootstrap. A refusal is not fatal.
    KadBootstrap,
    /// Advertise the rendezvous key, then call
    /// [`PeerDiscovery::on_advertised`].
    Advertise,
    /// Start a provider query for the rendezvous key and hand its id to
    /// [`PeerDiscovery::on_query_started`].
    QueryProviders,
    /// Call [`PeerDiscovery::on_retry_timer`] after this delay.
    ScheduleRetry(Duration),
    /// Discovery reached a topic peer.
    Completed { peer_id: PeerId },
    /// Discovery stopped without reaching a topic peer.
    Failed { reason: String },
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Round<Q> {
    number: u32,
    query: Option<Q>,
    query_done: bool,
    dialing: HashSet<PeerId>,
    seen: HashSet<PeerId>,
}

impl<Q> Round<Q> {
    fn new(number: u32) -> Self {
        Self {
            number,
            query: None,
            query_done: false,
            dialing: HashSet::new(),
            seen: HashSet::new(),
        }
    }
}

#[derive(Debug)]
enum State<Q> {
    Idle,
    Bootstrapping { pending: HashSet<PeerId>, reached: usize },
    Advertising,
    Searching(Round<Q>),
    Waiting { round: u32 },
    Connected { peer_id: PeerId },
    Failed,
}

/// Finds one other peer that advertises the same rendezvous key.
#[derive(Debug)]
pub struct PeerDiscovery<Q = QueryId> {
    local_peer_id: PeerId,
    key: RendezvousKey,
    bootstrap: Vec<(PeerId, Vec<Multiaddr>)>,
    config: DiscoveryConfig,
    state: State<Q>,
}

impl<Q> PeerDiscovery<Q>
where
    Q: Copy + Eq + fmt::Debug,
{
    /// Creates a discovery run for `key`. Bootstrap entries for the same
    /// peer are merged; the local peer is ignored.
    pub fn new(
        local_peer_id: PeerId,
        key: RendezvousKey,
        bootstrap: Vec<(PeerId, Multiaddr)>,
        config: DiscoveryConfig,
    ) -> Self {
        let mut grouped: Vec<(PeerId, Vec<Multiaddr>)> = Vec::new();
        let mut index: HashMap<PeerId, usize> = HashMap::new();
        for (peer_id, addr) in bootstrap {
            if peer_id == local_peer_id {
                continue;
            }
            match index.get(&peer_id) {
                Some(&i) => {
                    if !grouped[i].1.contains(&addr) {
                        grouped[i].1.push(addr);
                    }
                }
                None => {
                    index.insert(peer_id, grouped.len());
                    grouped.push((peer_id, vec![addr]));
                }
            }
        }

        Self {
            local_peer_id,
            key,
            bootstrap: grouped,
            config,
            state: State::Idle,
        }
    }

    pub fn key(&self) -> &RendezvousKey {
        &self.key
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Current phase.
    pub fn phase(&self) -> DiscoveryPhase {
        match self.state {
            State::Idle => DiscoveryPhase::Idle,
            State::Bootstrapping { .. } => DiscoveryPhase::Bootstrapping,
            State::Advertising => DiscoveryPhase::Advertising,
            State::Searching(_) | State::Waiting { .. } => DiscoveryPhase::Searching,
            State::Connected { .. } => DiscoveryPhase::Connected,
            State::Failed => DiscoveryPhase::Failed,
        }
    }

    /// Current search round, `0` before searching starts.
    pub fn round(&self) -> u32 {
        match &self.state {
            State::Searching(round) => round.number,
            State::Waiting { round } => *round,
            _ => 0,
        }
    }

    /// The topic peer discovery settled on, if any.
    pub fn connected_peer(&self) -> Option<PeerId> {
        match self.state {
            State::Connected { peer_id } => Some(peer_id),
            _ => None,
        }
    }

    /// Kicks off the bootstrap phase. Calling it again is a no-op.
    pub fn start(&mut self) -> Vec<DiscoveryAction> {
        if !matches!(self.state, State::Idle) {
            return Vec::new();
        }

        if self.bootstrap.is_empty() {
            tracing::info!("no bootstrap peers, skipping straight to advertising");
            return self.finish_bootstrap(0);
        }

        tracing::info!(count = self.bootstrap.len(), "connecting to bootstrap peers");
        let mut actions: Vec<DiscoveryAction> = self
            .bootstrap
            .iter()
            .map(|(peer_id, addrs)| DiscoveryAction::Dial {
                peer_id: *peer_id,
                addrs: addrs.clone(),
            })
            .collect();
        actions.push(DiscoveryAction::ScheduleBootstrapDeadline(
            self.config.bootstrap_dial_timeout,
        ));

        self.state = State::Bootstrapping {
            pending: self.bootstrap.iter().map(|(p, _)| *p).collect(),
            reached: 0,
        };
        actions
    }

    /// A dial (or an already-open connection) to `peer_id` succeeded.
    pub fn on_dial_succeeded(&mut self, peer_id: PeerId) -> Vec<DiscoveryAction> {
        match &mut self.state {
            State::Bootstrapping { pending, reached } => {
                if !pending.remove(&peer_id) {
                    return Vec::new();
                }
                *reached += 1;
                tracing::info!(%peer_id, "connection established with bootstrap node");
                let mut actions = vec![DiscoveryAction::Greet { peer_id }];
                if pending.is_empty() {
                    let reached = *reached;
                    actions.extend(self.finish_bootstrap(reached));
                }
                actions
            }
            State::Searching(round) => {
                if !round.dialing.remove(&peer_id) {
                    return Vec::new();
                }
                tracing::info!(%peer_id, round = round.number, "connected to topic peer");
                self.state = State::Connected { peer_id };
                vec![DiscoveryAction::Completed { peer_id }]
            }
            _ => Vec::new(),
        }
    }

    /// A dial to `peer_id` failed. Never fatal.
    pub fn on_dial_failed(&mut self, peer_id: PeerId, reason: &str) -> Vec<DiscoveryAction> {
        match &mut self.state {
            State::Bootstrapping { pending, reached } => {
                if !pending.remove(&peer_id) {
                    return Vec::new();
                }
                tracing::warn!(%peer_id, %reason, "failed to connect to bootstrap node");
                if pending.is_empty() {
                    let reached = *reached;
                    return self.finish_bootstrap(reached);
                }
                Vec::new()
            }
            State::Searching(round) => {
                if !round.dialing.remove(&peer_id) {
                    return Vec::new();
                }
                tracing::warn!(%peer_id, %reason, "failed connecting to discovered peer");
                self.maybe_end_round()
            }
            _ => Vec::new(),
        }
    }

    /// The bootstrap deadline fired. Outstanding dials are abandoned.
    pub fn on_bootstrap_deadline(&mut self) -> Vec<DiscoveryAction> {
        match &self.state {
            State::Bootstrapping { pending, reached } => {
                tracing::warn!(
                    outstanding = pending.len(),
                    "bootstrap dial deadline reached, continuing"
                );
                let reached = *reached;
                self.finish_bootstrap(reached)
            }
            _ => Vec::new(),
        }
    }

    /// The advertisement was placed (or refused and logged).
    pub fn on_advertised(&mut self) -> Vec<DiscoveryAction> {
        if !matches!(self.state, State::Advertising) {
            return Vec::new();
        }
        tracing::info!(topic = self.key.topic(), "advertised rendezvous key");
        self.begin_round(1)
    }

    /// Records the id of the provider query started for the current round.
    pub fn on_query_started(&mut self, query: Q) {
        if let State::Searching(round) = &mut self.state {
            if round.query.is_none() {
                round.query = Some(query);
            }
        }
    }

    /// A batch of providers arrived for `query`.
    pub fn on_providers(&mut self, query: Q, providers: &[PeerId]) -> Vec<DiscoveryAction> {
        let local = self.local_peer_id;
        let State::Searching(round) = &mut self.state else {
            return Vec::new();
        };
        if round.query != Some(query) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        for peer_id in providers {
            if *peer_id == local || !round.seen.insert(*peer_id) {
                continue;
            }
            tracing::debug!(%peer_id, round = round.number, "found topic peer");
            round.dialing.insert(*peer_id);
            actions.push(DiscoveryAction::Dial {
                peer_id: *peer_id,
                addrs: Vec::new(),
            });
        }
        actions
    }

    /// The provider query for `query` finished without error.
    pub fn on_query_finished(&mut self, query: Q) -> Vec<DiscoveryAction> {
        match &mut self.state {
            State::Searching(round) if round.query == Some(query) => {
                round.query_done = true;
                self.maybe_end_round()
            }
            _ => Vec::new(),
        }
    }

    /// The provider query for `query` failed. Discovery stops.
    pub fn on_query_failed(&mut self, query: Q, reason: &str) -> Vec<DiscoveryAction> {
        match &self.state {
            State::Searching(round) if round.query == Some(query) => {
                tracing::error!(%reason, round = round.number, "failed to find peers");
                self.fail(format!("provider query failed: {reason}"))
            }
            _ => Vec::new(),
        }
    }

    /// The retry timer fired.
    pub fn on_retry_timer(&mut self) -> Vec<DiscoveryAction> {
        match self.state {
            State::Waiting { round } => self.begin_round(round + 1),
            _ => Vec::new(),
        }
    }

    /// `peer_id` lost its last connection.
    pub fn on_peer_disconnected(&mut self, peer_id: PeerId) -> Vec<DiscoveryAction> {
        match self.state {
            State::Connected { peer_id: connected }
                if connected == peer_id && self.config.rediscover_on_disconnect =>
            {
                tracing::info!(%peer_id, "topic peer disconnected, searching again");
                self.begin_round(1)
            }
            _ => Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn finish_bootstrap(&mut self, reached: usize) -> Vec<DiscoveryAction> {
        tracing::info!(
            reached,
            total = self.bootstrap.len(),
            "bootstrap phase complete"
        );
        self.state = State::Advertising;
        vec![DiscoveryAction::KadBootstrap, DiscoveryAction::Advertise]
    }

    fn begin_round(&mut self, number: u32) -> Vec<DiscoveryAction> {
        tracing::info!(round = number, topic = self.key.topic(), "searching for peers");
        self.state = State::Searching(Round::new(number));
        vec![DiscoveryAction::QueryProviders]
    }

    fn maybe_end_round(&mut self) -> Vec<DiscoveryAction> {
        let State::Searching(round) = &self.state else {
            return Vec::new();
        };
        if !round.query_done || !round.dialing.is_empty() {
            return Vec::new();
        }

        let number = round.number;
        if let Some(max) = self.config.max_search_rounds {
            if number >= max {
                return self.fail(format!("no topic peer found after {number} search rounds"));
            }
        }

        tracing::debug!(
            round = number,
            retry_in = ?self.config.search_interval,
            "no topic peer reached this round"
        );
        self.state = State::Waiting { round: number };
        vec![DiscoveryAction::ScheduleRetry(self.config.search_interval)]
    }

    fn fail(&mut self, reason: String) -> Vec<DiscoveryAction> {
        self.state = State::Failed;
        vec![DiscoveryAction::Failed { reason }]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> Multiaddr {
        format!("/ip4/127.0.0.1/tcp/{port}").parse().unwrap()
    }

    fn discovery(bootstrap: Vec<(PeerId, Multiaddr)>, config: DiscoveryConfig) -> PeerDiscovery<u64> {
        PeerDiscovery::new(
            PeerId::random(),
            RendezvousKey::from_topic("fx-quotes"),
            bootstrap,
            config,
        )
    }

    /// Drives an empty-bootstrap discovery into round 1 with query `1`.
    fn searching(config: DiscoveryConfig) -> PeerDiscovery<u64> {
        let mut d = discovery(Vec::new(), config);
        d.start();
        assert_eq!(d.on_advertised(), vec![DiscoveryAction::QueryProviders]);
        d.on_query_started(1);
        d
    }

    #[test]
    fn empty_bootstrap_goes_straight_to_advertising() {
        let mut d = discovery(Vec::new(), DiscoveryConfig::default());
        assert_eq!(d.phase(), DiscoveryPhase::Idle);

        let actions = d.start();
        assert_eq!(
            actions,
            vec![DiscoveryAction::KadBootstrap, DiscoveryAction::Advertise]
        );
        assert_eq!(d.phase(), DiscoveryPhase::Advertising);

        assert_eq!(d.on_advertised(), vec![DiscoveryAction::QueryProviders]);
        assert_eq!(d.phase(), DiscoveryPhase::Searching);
        assert_eq!(d.round(), 1);

        // Starting twice does nothing.
        assert!(d.start().is_empty());
    }

    #[test]
    fn bootstrap_barrier_waits_for_every_dial() {
        let (a, b) = (PeerId::random(), PeerId::random());
        let mut d = discovery(
            vec![(a, addr(1)), (b, addr(2)), (a, addr(3))],
            DiscoveryConfig::default(),
        );

        let actions = d.start();
        assert_eq!(actions.len(), 3);
        assert!(actions.contains(&DiscoveryAction::Dial {
            peer_id: a,
            addrs: vec![addr(1), addr(3)],
        }));
        assert!(actions.contains(&DiscoveryAction::ScheduleBootstrapDeadline(
            DEFAULT_BOOTSTRAP_DIAL_TIMEOUT
        )));

        assert_eq!(
            d.on_dial_succeeded(a),
            vec![DiscoveryAction::Greet { peer_id: a }]
        );
        assert_eq!(d.phase(), DiscoveryPhase::Bootstrapping);

        assert_eq!(
            d.on_dial_failed(b, "connection refused"),
            vec![DiscoveryAction::KadBootstrap, DiscoveryAction::Advertise]
        );
        assert_eq!(d.phase(), DiscoveryPhase::Advertising);
    }

    #[test]
    fn unreachable_bootstrap_set_is_not_an_error() {
        let a = PeerId::random();
        let mut d = discovery(vec![(a, addr(1))], DiscoveryConfig::default());
        d.start();

        let actions = d.on_dial_failed(a, "refused");
        assert_eq!(
            actions,
            vec![DiscoveryAction::KadBootstrap, DiscoveryAction::Advertise]
        );
    }

    #[test]
    fn deadline_closes_the_barrier() {
        let a = PeerId::random();
        let mut d = discovery(vec![(a, addr(1))], DiscoveryConfig::default());
        d.start();

        assert_eq!(
            d.on_bootstrap_deadline(),
            vec![DiscoveryAction::KadBootstrap, DiscoveryAction::Advertise]
        );
        // The late result is ignored.
        assert!(d.on_dial_succeeded(a).is_empty());
        assert!(d.on_bootstrap_deadline().is_empty());
    }

    #[test]
    fn first_successful_dial_completes_discovery() {
        let mut d = searching(DiscoveryConfig::default());
        let (p1, p2) = (PeerId::random(), PeerId::random());

        let actions = d.on_providers(1, &[p1, p2]);
        assert_eq!(actions.len(), 2);

        assert!(d.on_dial_failed(p1, "refused").is_empty());
        assert_eq!(
            d.on_dial_succeeded(p2),
            vec![DiscoveryAction::Completed { peer_id: p2 }]
        );
        assert_eq!(d.phase(), DiscoveryPhase::Connected);
        assert_eq!(d.connected_peer(), Some(p2));

        // Nothing happens after completion.
        assert!(d.on_query_finished(1).is_empty());
        assert!(d.on_retry_timer().is_empty());
    }

    #[test]
    fn self_and_duplicates_are_not_dialed() {
        let local = PeerId::random();
        let mut d: PeerDiscovery<u64> = PeerDiscovery::new(
            local,
            RendezvousKey::from_topic("fx-quotes"),
            Vec::new(),
            DiscoveryConfig::default(),
        );
        d.start();
        d.on_advertised();
        d.on_query_started(7);

        let other = PeerId::random();
        assert_eq!(d.on_providers(7, &[local, other]).len(), 1);
        assert!(d.on_providers(7, &[other]).is_empty());
    }

    #[test]
    fn empty_round_schedules_a_retry() {
        let mut d = searching(DiscoveryConfig::default());

        assert_eq!(
            d.on_query_finished(1),
            vec![DiscoveryAction::ScheduleRetry(DEFAULT_SEARCH_INTERVAL)]
        );
        assert_eq!(d.phase(), DiscoveryPhase::Searching);
        assert_eq!(d.round(), 1);

        assert_eq!(d.on_retry_timer(), vec![DiscoveryAction::QueryProviders]);
        assert_eq!(d.round(), 2);
    }

    #[test]
    fn round_waits_for_outstanding_dials() {
        let mut d = searching(DiscoveryConfig::default());
        let p = PeerId::random();
        d.on_providers(1, &[p]);

        assert!(d.on_query_finished(1).is_empty());
        assert_eq!(
            d.on_dial_failed(p, "timeout"),
            vec![DiscoveryAction::ScheduleRetry(DEFAULT_SEARCH_INTERVAL)]
        );
    }

    #[test]
    fn stale_query_ids_are_ignored() {
        let mut d = searching(DiscoveryConfig::default());
        assert!(d.on_providers(99, &[PeerId::random()]).is_empty());
        assert!(d.on_query_finished(99).is_empty());
        assert!(d.on_query_failed(99, "boom").is_empty());
        assert_eq!(d.phase(), DiscoveryPhase::Searching);
    }

    #[test]
    fn query_failure_is_fatal() {
        let mut d = searching(DiscoveryConfig::default());
        let actions = d.on_query_failed(1, "timeout");
        assert!(matches!(
            actions.as_slice(),
            [DiscoveryAction::Failed { reason }] if reason.contains("timeout")
        ));
        assert_eq!(d.phase(), DiscoveryPhase::Failed);
        assert!(d.on_retry_timer().is_empty());
    }

    #[test]
    fn round_cap_reports_exhaustion() {
        let mut d = searching(DiscoveryConfig {
            max_search_rounds: Some(2),
            ..DiscoveryConfig::default()
        });

        assert!(matches!(
            d.on_query_finished(1).as_slice(),
            [DiscoveryAction::ScheduleRetry(_)]
        ));
        d.on_retry_timer();
        d.on_query_started(2);

        let actions = d.on_query_finished(2);
        assert!(matches!(
            actions.as_slice(),
            [DiscoveryAction::Failed { reason }] if reason.contains("2 search rounds")
        ));
        assert_eq!(d.phase(), DiscoveryPhase::Failed);
    }

    #[test]
    fn unbounded_search_never_connects_without_peers() {
        let mut d = searching(DiscoveryConfig::default());
        for query in 1..=50u64 {
            if query > 1 {
                assert_eq!(d.on_retry_timer(), vec![DiscoveryAction::QueryProviders]);
                d.on_query_started(query);
            }
            assert!(matches!(
                d.on_query_finished(query).as_slice(),
                [DiscoveryAction::ScheduleRetry(_)]
            ));
        }
        assert_eq!(d.round(), 50);
        assert_eq!(d.connected_peer(), None);
    }

    #[test]
    fn disconnect_is_ignored_unless_rediscovery_enabled() {
        let mut d = searching(DiscoveryConfig::default());
        let p = PeerId::random();
        d.on_providers(1, &[p]);
        d.on_dial_succeeded(p);

        assert!(d.on_peer_disconnected(p).is_empty());
        assert_eq!(d.phase(), DiscoveryPhase::Connected);
    }

    #[test]
    fn rediscovery_restarts_searching() {
        let mut d = searching(DiscoveryConfig {
            rediscover_on_disconnect: true,
            ..DiscoveryConfig::default()
        });
        let p = PeerId::random();
        d.on_providers(1, &[p]);
        d.on_dial_succeeded(p);

        assert!(d.on_peer_disconnected(PeerId::random()).is_empty());
        assert_eq!(d.on_peer_disconnected(p), vec![DiscoveryAction::QueryProviders]);
        assert_eq!(d.phase(), DiscoveryPhase::Searching);
        assert_eq!(d.round(), 1);
    }
}
