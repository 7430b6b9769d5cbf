//! Gossipsub wrapper for quote topics.
//!
//! Messages are signed by the publishing node
//! (`MessageAuthenticity::Signed`) and capped at [`MAX_GOSSIP_SIZE`].
//! Payload contents are not interpreted here; decoding happens in the
//! node's receive loop.

use std::time::Duration;

use libp2p::gossipsub;
use libp2p::identity;

use quotenet_types::{QuotenetError, Result};

use crate::config::NetworkConfig;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum allowed gossip message size (64 KiB).
pub const MAX_GOSSIP_SIZE: usize = 65_536;

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Builds a configured `gossipsub::Behaviour`.
///
/// # Errors
///
/// Returns `QuotenetError::NetworkError` if the gossipsub config is
/// rejected by libp2p.
pub fn build_gossip_behaviour(
    keypair: &identity::Keypair,
    config: &NetworkConfig,
) -> Result<gossipsub::Behaviour> {
    let gossip_config = gossipsub::ConfigBuilder::default()
        .max_transmit_size(MAX_GOSSIP_SIZE)
        .heartbeat_interval(Duration::from_millis(config.gossip_heartbeat_ms))
        .build()
        .map_err(|e| QuotenetError::NetworkError {
            reason: format!("failed to build gossipsub config: {e}"),
        })?;

    gossipsub::Behaviour::new(
        gossipsub::MessageAuthenticity::Signed(keypair.clone()),
        gossip_config,
    )
    .map_err(|e| QuotenetError::NetworkError {
        reason: format!("failed to create gossipsub behaviour: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Topic helpers
// ---------------------------------------------------------------------------

/// Creates a gossipsub [`gossipsub::IdentTopic`] from a topic string.
pub fn topic(name: &str) -> gossipsub::IdentTopic {
    gossipsub::IdentTopic::new(name)
}

/// Subscribes to `name`.
///
/// Returns `Ok(true)` if the subscription is new, `Ok(false)` if the
/// node was already subscribed.
///
/// # Errors
///
/// Returns `QuotenetError::NetworkError` if gossipsub refuses the
/// subscription.
pub fn join(behaviour: &mut gossipsub::Behaviour, name: &str) -> Result<bool> {
    behaviour
        .subscribe(&topic(name))
        .map_err(|e| QuotenetError::NetworkError {
            reason: format!("failed to subscribe to topic '{name}': {e}"),
        })
}

/// Unsubscribes from `name`. Returns `false` if the node was not
/// subscribed.
pub fn leave(behaviour: &mut gossipsub::Behaviour, name: &str) -> bool {
    behaviour.unsubscribe(&topic(name))
}

/// Publishes raw bytes to a topic.
///
/// # Errors
///
/// Returns `QuotenetError::PublishError` if the payload exceeds
/// [`MAX_GOSSIP_SIZE`], or if gossipsub refuses the message (most
/// commonly because no peer is subscribed to the topic yet).
pub fn publish(
    behaviour: &mut gossipsub::Behaviour,
    topic_name: &str,
    data: Vec<u8>,
) -> Result<gossipsub::MessageId> {
    if data.len() > MAX_GOSSIP_SIZE {
        return Err(QuotenetError::PublishError {
            reason: format!(
                "gossip payload size {} exceeds maximum {}",
                data.len(),
                MAX_GOSSIP_SIZE,
            ),
        });
    }

    behaviour
        .publish(topic(topic_name), data)
        .map_err(|e| QuotenetError::PublishError {
            reason: format!("failed to publish to topic '{topic_name}': {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn behaviour() -> gossipsub::Behaviour {
        let keypair = identity::Keypair::generate_ed25519();
        build_gossip_behaviour(&keypair, &NetworkConfig::default()).unwrap()
    }

    #[test]
    fn topic_hash_is_the_name() {
        assert_eq!(topic("fx-quotes").hash().as_str(), "fx-quotes");
    }

    #[test]
    fn join_is_idempotent() {
        let mut b = behaviour();
        assert!(join(&mut b, "fx-quotes").unwrap());
        assert!(!join(&mut b, "fx-quotes").unwrap());
    }

    #[test]
    fn leave_after_join() {
        let mut b = behaviour();
        join(&mut b, "fx-quotes").unwrap();
        assert!(leave(&mut b, "fx-quotes"));
        assert!(!leave(&mut b, "fx-quotes"));
    }

    #[test]
    fn publish_without_peers_fails() {
        let mut b = behaviour();
        join(&mut b, "fx-quotes").unwrap();
        let err = publish(&mut b, "fx-quotes", b"{}".to_vec()).unwrap_err();
        assert!(matches!(err, QuotenetError::PublishError { .. }));
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut b = behaviour();
        join(&mut b, "fx-quotes").unwrap();

        let big_data = vec![0u8; MAX_GOSSIP_SIZE + 1];
        let err = publish(&mut b, "fx-quotes", big_data).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }
}
