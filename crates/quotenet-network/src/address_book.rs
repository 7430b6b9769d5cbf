//! Local address book with per-address expiry.
//!
//! Records where peers (including this node, for its relay circuit
//! address) can be reached. Every address carries a TTL; lookups never
//! return expired entries and [`AddressBook::prune`] drops them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use libp2p::{Multiaddr, PeerId};

/// TTL for addresses learned from identify or provider records.
pub const LEARNED_ADDR_TTL: Duration = Duration::from_secs(60 * 60);

/// Per-peer map of address to expiry instant.
#[derive(Debug, Default)]
pub struct AddressBook {
    entries: HashMap<PeerId, HashMap<Multiaddr, Instant>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `addrs` for `peer`, valid for `ttl` from now.
    pub fn add_addrs<I>(&mut self, peer: PeerId, addrs: I, ttl: Duration)
    where
        I: IntoIterator<Item = Multiaddr>,
    {
        self.add_addrs_at(peer, addrs, ttl, Instant::now());
    }

    /// Records `addrs` for `peer`, valid for `ttl` from `now`.
    ///
    /// Re-adding an address moves its expiry forward, never back.
    pub fn add_addrs_at<I>(&mut self, peer: PeerId, addrs: I, ttl: Duration, now: Instant)
    where
        I: IntoIterator<Item = Multiaddr>,
    {
        let expires = now + ttl;
        let book = self.entries.entry(peer).or_default();
        for addr in addrs {
            book.entry(addr)
                .and_modify(|existing| {
                    if *existing < expires {
                        *existing = expires;
                    }
                })
                .or_insert(expires);
        }
    }

    /// Unexpired addresses for `peer`.
    pub fn addrs(&self, peer: &PeerId) -> Vec<Multiaddr> {
        self.addrs_at(peer, Instant::now())
    }

    pub fn addrs_at(&self, peer: &PeerId, now: Instant) -> Vec<Multiaddr> {
        self.entries
            .get(peer)
            .map(|book| {
                book.iter()
                    .filter(|(_, expires)| **expires > now)
                    .map(|(addr, _)| addr.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Expiry of a specific address, if recorded.
    pub fn expires_at(&self, peer: &PeerId, addr: &Multiaddr) -> Option<Instant> {
        self.entries.get(peer)?.get(addr).copied()
    }

    /// Drops every entry that expired at or before `now`. Returns the
    /// number of addresses removed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, book| {
            let before = book.len();
            book.retain(|_, expires| *expires > now);
            removed += before - book.len();
            !book.is_empty()
        });
        removed
    }

    /// Number of peers with at least one recorded address.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> Multiaddr {
        format!("/ip4/127.0.0.1/tcp/{port}").parse().unwrap()
    }

    #[test]
    fn fresh_address_is_returned() {
        let mut book = AddressBook::new();
        let peer = PeerId::random();
        book.add_addrs(peer, [addr(1)], Duration::from_secs(60));
        assert_eq!(book.addrs(&peer), vec![addr(1)]);
    }

    #[test]
    fn expired_address_is_hidden() {
        let mut book = AddressBook::new();
        let peer = PeerId::random();
        let now = Instant::now();
        book.add_addrs_at(peer, [addr(1)], Duration::from_secs(10), now);

        assert_eq!(book.addrs_at(&peer, now + Duration::from_secs(9)).len(), 1);
        assert!(book.addrs_at(&peer, now + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn re_adding_extends_but_never_shortens() {
        let mut book = AddressBook::new();
        let peer = PeerId::random();
        let now = Instant::now();

        book.add_addrs_at(peer, [addr(1)], Duration::from_secs(100), now);
        book.add_addrs_at(peer, [addr(1)], Duration::from_secs(10), now);
        assert_eq!(
            book.expires_at(&peer, &addr(1)),
            Some(now + Duration::from_secs(100))
        );

        book.add_addrs_at(peer, [addr(1)], Duration::from_secs(200), now);
        assert_eq!(
            book.expires_at(&peer, &addr(1)),
            Some(now + Duration::from_secs(200))
        );
    }

    #[test]
    fn prune_removes_only_expired() {
        let mut book = AddressBook::new();
        let a = PeerId::random();
        let b = PeerId::random();
        let now = Instant::now();

        book.add_addrs_at(a, [addr(1), addr(2)], Duration::from_secs(5), now);
        book.add_addrs_at(b, [addr(3)], Duration::from_secs(50), now);

        let removed = book.prune(now + Duration::from_secs(10));
        assert_eq!(removed, 2);
        assert_eq!(book.len(), 1);
        assert!(book.expires_at(&a, &addr(1)).is_none());
        assert!(book.expires_at(&b, &addr(3)).is_some());
    }

    #[test]
    fn unknown_peer_has_no_addrs() {
        let book = AddressBook::new();
        assert!(book.addrs(&PeerId::random()).is_empty());
        assert!(book.is_empty());
    }
}
