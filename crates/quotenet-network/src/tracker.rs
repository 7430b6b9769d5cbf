//! Connected-peer counter shared between the swarm and status queries.
//!
//! The swarm calls [`ConnectionTracker::on_connected`] when the first
//! connection to a peer is established and
//! [`ConnectionTracker::on_disconnected`] when the last one closes. The
//! counter never goes below zero: a disconnect at zero is logged and
//! ignored.

use std::sync::{Arc, Mutex, MutexGuard};

use libp2p::PeerId;

/// Thread-safe count of currently connected peers.
///
/// Cloning is cheap and every clone observes the same counter.
#[derive(Clone, Debug, Default)]
pub struct ConnectionTracker {
    count: Arc<Mutex<usize>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly connected peer and returns the updated count.
    pub fn on_connected(&self, peer: &PeerId) -> usize {
        let mut count = self.lock();
        *count += 1;
        let now = *count;
        drop(count);

        tracing::info!(peer_id = %peer, connected = now, "peer connected");
        now
    }

    /// Records a disconnected peer and returns the updated count.
    pub fn on_disconnected(&self, peer: &PeerId) -> usize {
        let mut count = self.lock();
        if *count == 0 {
            drop(count);
            tracing::warn!(peer_id = %peer, "disconnect reported with no connected peers, ignoring");
            return 0;
        }
        *count -= 1;
        let now = *count;
        drop(count);

        tracing::info!(peer_id = %peer, connected = now, "peer disconnected");
        now
    }

    /// Snapshot of the current count.
    pub fn count(&self) -> usize {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        match self.count.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("connection tracker lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(ConnectionTracker::new().count(), 0);
    }

    #[test]
    fn connect_then_disconnect() {
        let tracker = ConnectionTracker::new();
        let peer = PeerId::random();
        assert_eq!(tracker.on_connected(&peer), 1);
        assert_eq!(tracker.on_disconnected(&peer), 0);
    }

    #[test]
    fn disconnect_at_zero_is_ignored() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.on_disconnected(&PeerId::random()), 0);
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn clones_share_the_counter() {
        let tracker = ConnectionTracker::new();
        let other = tracker.clone();
        other.on_connected(&PeerId::random());
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn concurrent_updates_balance_out() {
        let tracker = ConnectionTracker::new();
        let threads = 8;
        let per_thread = 500;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let tracker = tracker.clone();
                thread::spawn(move || {
                    let peer = PeerId::random();
                    for _ in 0..per_thread {
                        tracker.on_connected(&peer);
                    }
                    for _ in 0..per_thread / 2 {
                        tracker.on_disconnected(&peer);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.count(), threads * (per_thread - per_thread / 2));
    }

    proptest! {
        /// For any sequence of events the count is the number of
        /// connects minus the number of disconnects that found a
        /// positive count.
        #[test]
        fn count_matches_model(events in proptest::collection::vec(any::<bool>(), 0..200)) {
            let tracker = ConnectionTracker::new();
            let peer = PeerId::random();
            let mut model: usize = 0;

            for connected in events {
                if connected {
                    model += 1;
                    prop_assert_eq!(tracker.on_connected(&peer), model);
                } else {
                    model = model.saturating_sub(1);
                    prop_assert_eq!(tracker.on_disconnected(&peer), model);
                }
            }

            prop_assert_eq!(tracker.count(), model);
        }
    }
}
