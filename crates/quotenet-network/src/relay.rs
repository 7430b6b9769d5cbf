//! Relay support for the bootstrap role.
//!
//! A relay-capable node runs the Circuit Relay v2 server so peers behind
//! NAT can reserve circuits through it, and announces itself as
//! reachable via `/p2p-circuit` by recording that address for its own
//! identity in the local [`AddressBook`] with a 24 hour TTL.
//!
//! Every node carries the relay client transport
//! (`SwarmBuilder::with_relay_client`), so circuit addresses are
//! dialable regardless of role.

use std::time::{Duration, Instant};

use libp2p::multiaddr::Protocol;
use libp2p::relay;
use libp2p::{Multiaddr, PeerId};

use crate::address_book::AddressBook;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lifetime of the relay address announcement.
pub const RELAY_ADDR_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// With renewal enabled, the announcement is refreshed once less than
/// this much of its TTL remains.
pub const RELAY_RENEW_MARGIN: Duration = Duration::from_secs(60 * 60);

// ---------------------------------------------------------------------------
// Relay server configuration
// ---------------------------------------------------------------------------

/// Builds a relay server [`relay::Behaviour`] if enabled.
///
/// Returns `Some(behaviour)` when `enable` is true, `None` otherwise.
/// The caller wraps this in a `Toggle`.
pub fn build_relay_server_behaviour(local_peer_id: PeerId, enable: bool) -> Option<relay::Behaviour> {
    if enable {
        tracing::info!("relay server mode enabled");
        Some(relay::Behaviour::new(local_peer_id, relay::Config::default()))
    } else {
        tracing::debug!("relay server mode disabled");
        None
    }
}

// ---------------------------------------------------------------------------
// Announcement
// ---------------------------------------------------------------------------

/// The bare relay-circuit marker address, `/p2p-circuit`.
pub fn relay_circuit_addr() -> Multiaddr {
    Multiaddr::empty().with(Protocol::P2pCircuit)
}

/// A recorded relay announcement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelayAnnouncement {
    pub peer_id: PeerId,
    pub addr: Multiaddr,
    pub registered_at: Instant,
    pub expires_at: Instant,
}

impl RelayAnnouncement {
    /// Time between registration and expiry.
    pub fn ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(self.registered_at)
    }

    /// Whether less than [`RELAY_RENEW_MARGIN`] of the TTL remains at `now`.
    pub fn needs_renewal(&self, now: Instant) -> bool {
        self.expires_at.saturating_duration_since(now) < RELAY_RENEW_MARGIN
    }

    /// When the renewal check should next fire.
    pub fn renew_at(&self) -> Instant {
        self.expires_at
            .checked_sub(RELAY_RENEW_MARGIN)
            .unwrap_or(self.registered_at)
    }
}

/// Registers `/p2p-circuit` for `local_peer_id` in `book`, valid for
/// [`RELAY_ADDR_TTL`].
pub fn announce_relay(book: &mut AddressBook, local_peer_id: PeerId) -> RelayAnnouncement {
    announce_relay_at(book, local_peer_id, Instant::now())
}

/// [`announce_relay`] with an explicit registration instant.
pub fn announce_relay_at(
    book: &mut AddressBook,
    local_peer_id: PeerId,
    now: Instant,
) -> RelayAnnouncement {
    let addr = relay_circuit_addr();
    book.add_addrs_at(local_peer_id, [addr.clone()], RELAY_ADDR_TTL, now);

    tracing::info!(peer_id = %local_peer_id, "announced as relay server");

    RelayAnnouncement {
        peer_id: local_peer_id,
        addr,
        registered_at: now,
        expires_at: now + RELAY_ADDR_TTL,
    }
}

// ---------------------------------------------------------------------------
// Relay event logging
// ---------------------------------------------------------------------------

/// Logs relay client events at appropriate levels.
pub fn log_relay_client_event(event: &relay::client::Event) {
    match event {
        relay::client::Event::ReservationReqAccepted {
            relay_peer_id,
            renewal,
            ..
        } => {
            tracing::info!(%relay_peer_id, renewal, "relay reservation accepted");
        }
        relay::client::Event::OutboundCircuitEstablished { relay_peer_id, .. } => {
            tracing::info!(%relay_peer_id, "outbound relay circuit established");
        }
        relay::client::Event::InboundCircuitEstablished { src_peer_id, .. } => {
            tracing::info!(%src_peer_id, "inbound relay circuit established");
        }
        #[allow(unreachable_patterns)]
        other => {
            tracing::debug!(?other, "relay client: other event");
        }
    }
}

/// Logs relay server events at appropriate levels.
pub fn log_relay_server_event(event: &relay::Event) {
    match event {
        relay::Event::ReservationReqAccepted {
            src_peer_id,
            renewed,
            ..
        } => {
            tracing::info!(%src_peer_id, renewed, "relay server: reservation accepted");
        }
        relay::Event::ReservationReqDenied { src_peer_id, .. } => {
            tracing::warn!(%src_peer_id, "relay server: reservation denied");
        }
        relay::Event::ReservationTimedOut { src_peer_id, .. } => {
            tracing::debug!(%src_peer_id, "relay server: reservation timed out");
        }
        relay::Event::CircuitReqDenied {
            src_peer_id,
            dst_peer_id,
            ..
        } => {
            tracing::warn!(%src_peer_id, %dst_peer_id, "relay server: circuit request denied");
        }
        relay::Event::CircuitReqAccepted {
            src_peer_id,
            dst_peer_id,
            ..
        } => {
            tracing::info!(%src_peer_id, %dst_peer_id, "relay server: circuit request accepted");
        }
        relay::Event::CircuitClosed {
            src_peer_id,
            dst_peer_id,
            error,
            ..
        } => {
            tracing::debug!(%src_peer_id, %dst_peer_id, ?error, "relay server: circuit closed");
        }
        _ => {
            tracing::trace!(?event, "relay server: other event");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_addr_is_bare_marker() {
        assert_eq!(relay_circuit_addr().to_string(), "/p2p-circuit");
    }

    #[test]
    fn announcement_ttl_is_exactly_24h() {
        let mut book = AddressBook::new();
        let peer = PeerId::random();
        let now = Instant::now();

        let ann = announce_relay_at(&mut book, peer, now);
        assert_eq!(ann.ttl(), Duration::from_secs(86_400));
        assert_eq!(
            book.expires_at(&peer, &relay_circuit_addr()),
            Some(now + RELAY_ADDR_TTL)
        );
    }

    #[test]
    fn announced_address_visible_until_expiry() {
        let mut book = AddressBook::new();
        let peer = PeerId::random();
        let now = Instant::now();
        announce_relay_at(&mut book, peer, now);

        let just_before = now + RELAY_ADDR_TTL - Duration::from_secs(1);
        assert_eq!(book.addrs_at(&peer, just_before), vec![relay_circuit_addr()]);
        assert!(book.addrs_at(&peer, now + RELAY_ADDR_TTL).is_empty());
    }

    #[test]
    fn renewal_due_inside_margin_only() {
        let mut book = AddressBook::new();
        let now = Instant::now();
        let ann = announce_relay_at(&mut book, PeerId::random(), now);

        assert!(!ann.needs_renewal(now));
        assert!(!ann.needs_renewal(now + Duration::from_secs(22 * 3600)));
        assert!(ann.needs_renewal(now + Duration::from_secs(23 * 3600 + 1)));
        assert_eq!(ann.renew_at(), now + Duration::from_secs(23 * 3600));
    }

    #[test]
    fn build_relay_server_enabled() {
        assert!(build_relay_server_behaviour(PeerId::random(), true).is_some());
    }

    #[test]
    fn build_relay_server_disabled() {
        assert!(build_relay_server_behaviour(PeerId::random(), false).is_none());
    }
}
