//! In-process notification bus.
//!
//! Uses `tokio::sync::broadcast`: every subscriber sees every notification
//! published after it subscribed. Publishing with no subscriber succeeds.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use starkindex_core::error::IndexerResult;
use starkindex_core::ports::EventBus;

pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// A published notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Broadcast-backed [`EventBus`].
pub struct InMemoryEventBus {
    sender: broadcast::Sender<Notification>,
    published: AtomicU64,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Receive notifications whose topic starts with `prefix` (`""` for all).
    ///
    /// Topics begin with the configuration hash, so subscribing to
    /// `"<hash>."` follows one application.
    pub fn subscribe(&self, prefix: impl Into<String>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            prefix: prefix.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total notifications published since creation.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> IndexerResult<()> {
        self.published.fetch_add(1, Ordering::Relaxed);
        let notification = Notification {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        // Err only means nobody is listening.
        let receivers = self.sender.send(notification).unwrap_or(0);
        trace!(topic, receivers, "notification published");
        Ok(())
    }
}

/// Receiving side of [`InMemoryEventBus::subscribe`].
pub struct Subscription {
    receiver: broadcast::Receiver<Notification>,
    prefix: String,
}

impl Subscription {
    /// Next matching notification, or `None` once the bus is dropped.
    ///
    /// A subscriber that falls behind skips the notifications it missed.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(n) if n.topic.starts_with(&self.prefix) => return Some(n),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, prefix = %self.prefix, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_filter_by_prefix() {
        let bus = InMemoryEventBus::new();
        let mut all = bus.subscribe("");
        let mut app = bus.subscribe("h1.");

        bus.publish("h2.tx.0x1.0xaa.10", b"other").await.unwrap();
        bus.publish("h1.event.0x1.0xaa_0.10", b"mine").await.unwrap();

        assert_eq!(all.recv().await.unwrap().payload, b"other");
        assert_eq!(all.recv().await.unwrap().topic, "h1.event.0x1.0xaa_0.10");
        let n = app.recv().await.unwrap();
        assert_eq!(n.payload, b"mine");
        assert_eq!(bus.published_count(), 2);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_succeeds() {
        let bus = InMemoryEventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish("h.tx.0x1.0x2.3", b"{}").await.unwrap();
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_receiving() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut sub = bus.subscribe("");
        for i in 0..5 {
            bus.publish(&format!("h.tx.0x1.0x{i}.1"), b"").await.unwrap();
        }
        let n = sub.recv().await.unwrap();
        assert_eq!(n.topic, "h.tx.0x1.0x3.1");
    }
}
