//! Topic handles on top of the node's gossipsub.
//!
//! A [`PubSubChannel`] is a cheap, cloneable front for the event loop.
//! [`PubSubChannel::join`] returns a [`Topic`] that can publish and open
//! any number of [`Subscription`]s. Every subscription receives every
//! message the node gets on that topic, in arrival order, until it is
//! cancelled, the topic is left, or the node shuts down.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use libp2p::PeerId;
use quotenet_protocol::codec;
use quotenet_protocol::quote::PriceQuote;
use quotenet_types::Result;
use tokio::sync::mpsc;

use crate::command::{request, NodeCommand};

// ---------------------------------------------------------------------------
// InboundMessage
// ---------------------------------------------------------------------------

/// A gossip message as delivered to a subscription.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InboundMessage {
    /// Peer the message was received from.
    pub source: PeerId,
    pub topic: String,
    /// Undecoded payload.
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// PubSubChannel
// ---------------------------------------------------------------------------

/// Entry point for topic operations on a running node.
#[derive(Clone, Debug)]
pub struct PubSubChannel {
    commands: mpsc::Sender<NodeCommand>,
}

impl PubSubChannel {
    pub fn new(commands: mpsc::Sender<NodeCommand>) -> Self {
        Self { commands }
    }

    /// Joins `topic`. Joining twice is fine and yields an equivalent
    /// handle.
    ///
    /// # Errors
    ///
    /// `QuotenetError::NetworkError` if gossipsub refuses the
    /// subscription, `QuotenetError::NodeError` if the node is gone.
    pub async fn join(&self, topic: &str) -> Result<Topic> {
        let name = topic.to_string();
        let fresh = request(&self.commands, |reply| NodeCommand::JoinTopic {
            topic: name.clone(),
            reply,
        })
        .await??;
        tracing::info!(%topic, fresh, "joined topic");

        Ok(Topic {
            name,
            commands: self.commands.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Handle to a joined topic.
#[derive(Clone, Debug)]
pub struct Topic {
    name: String,
    commands: mpsc::Sender<NodeCommand>,
}

impl Topic {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publishes raw bytes. Best-effort: with no peer on the topic the
    /// publish fails and the caller decides whether to retry.
    ///
    /// # Errors
    ///
    /// `QuotenetError::PublishError` if gossipsub refuses the message
    /// or the topic was left.
    pub async fn publish(&self, data: Vec<u8>) -> Result<()> {
        request(&self.commands, |reply| NodeCommand::Publish {
            topic: self.name.clone(),
            data,
            reply,
        })
        .await?
    }

    /// Encodes `quote` as JSON and publishes it.
    pub async fn publish_quote(&self, quote: &PriceQuote) -> Result<()> {
        let data = codec::encode(quote)?;
        self.publish(data).await
    }

    /// Opens a new subscription on this topic.
    ///
    /// # Errors
    ///
    /// `QuotenetError::NodeError` if the topic was left or the node is
    /// gone.
    pub async fn subscribe(&self) -> Result<Subscription> {
        request(&self.commands, |reply| NodeCommand::Subscribe {
            topic: self.name.clone(),
            reply,
        })
        .await?
    }

    /// Leaves the topic. Every open subscription on it ends.
    pub async fn leave(self) -> Result<bool> {
        let left = request(&self.commands, |reply| NodeCommand::LeaveTopic {
            topic: self.name.clone(),
            reply,
        })
        .await??;
        tracing::info!(topic = %self.name, "left topic");
        Ok(left)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Stream of [`InboundMessage`]s for one topic.
///
/// Unbounded on purpose: the event loop must never block on a slow
/// reader. The stream ends after [`Subscription::cancel`], when the
/// topic is left, or when the node stops.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<InboundMessage>,
    cancelled: bool,
}

impl Subscription {
    pub(crate) fn new(topic: String, rx: mpsc::UnboundedReceiver<InboundMessage>) -> Self {
        Self {
            topic,
            rx,
            cancelled: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Ends the stream. Messages still buffered are discarded and the
    /// event loop drops its side on the next delivery.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            tracing::debug!(topic = %self.topic, "subscription cancelled");
        }
        self.cancelled = true;
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Stream for Subscription {
    type Item = InboundMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
