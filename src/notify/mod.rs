//! Notify module
//!
//! Announces committed exchange operations to other services. Messages are
//! JSON-encoded [`ExchangeEvent`]s on the `exchanges` topic; delivery is
//! at-least-once per subscriber with no ordering across currencies.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::ExchangeEvent;

/// Topic every exchange event is published on
pub const EXCHANGES_TOPIC: &str = "exchanges";

/// Publish Result type
pub type PublishResult<T> = Result<T, PublishError>;

/// Message channel errors
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Cannot encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Malformed message on {topic}: {reason}")]
    Malformed { topic: &'static str, reason: String },

    #[error("Channel closed")]
    Closed,
}

/// Outbound side of the message channel.
#[async_trait]
pub trait ExchangePublisher: Send + Sync {
    async fn publish(&self, event: &ExchangeEvent) -> PublishResult<()>;
}

/// In-process message channel over `tokio::sync::broadcast`.
///
/// Messages published while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<String>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> ExchangeFeed {
        ExchangeFeed {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl ExchangePublisher for BroadcastPublisher {
    async fn publish(&self, event: &ExchangeEvent) -> PublishResult<()> {
        let message = serde_json::to_string(event)?;

        match self.sender.send(message) {
            Ok(receivers) => {
                tracing::debug!(
                    topic = EXCHANGES_TOPIC,
                    event_type = event.event_type(),
                    currency = %event.currency(),
                    receivers = receivers,
                    "Event published"
                );
            }
            Err(_) => {
                tracing::debug!(
                    topic = EXCHANGES_TOPIC,
                    event_type = event.event_type(),
                    currency = %event.currency(),
                    "No subscribers, event dropped"
                );
            }
        }
        Ok(())
    }
}

/// Inbound side of the message channel.
#[derive(Debug)]
pub struct ExchangeFeed {
    receiver: broadcast::Receiver<String>,
}

impl ExchangeFeed {
    /// Next event. Messages overwritten before they were read are skipped
    /// with a warning.
    pub async fn recv(&mut self) -> PublishResult<ExchangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => {
                    return serde_json::from_str(&message).map_err(|e| PublishError::Malformed {
                        topic: EXCHANGES_TOPIC,
                        reason: e.to_string(),
                    });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = EXCHANGES_TOPIC, skipped = skipped, "Exchange feed lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(PublishError::Closed),
            }
        }
    }
}
