//! Memory events — observable milestones of the commit and compression path.
//!
//! Events are published when working memory changes shape. Subscribers (CLI
//! status output, tests, metrics) can watch without the pipeline knowing
//! about them. Nothing in the pipeline waits on a subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything the memory engine reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MemoryEvent {
    /// An exchange was archived and placed into head or tail
    ExchangeCommitted {
        conversation_id: String,
        total_rounds: usize,
        timestamp: DateTime<Utc>,
    },

    /// The tail overflowed and an exchange was demoted
    TailEvicted {
        conversation_id: String,
        user_message_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Pin judgment produced a new fact
    PinCreated {
        conversation_id: String,
        pin_id: String,
        timestamp: DateTime<Utc>,
    },

    /// An existing pin was superseded
    PinInvalidated {
        conversation_id: String,
        pin_id: String,
        timestamp: DateTime<Utc>,
    },

    /// All pins were folded into one
    PinsAggregated {
        conversation_id: String,
        merged: usize,
        timestamp: DateTime<Utc>,
    },

    /// Content entered the rolling window as a summary
    Summarized {
        conversation_id: String,
        kind: String, // "current_round" or "history"
        compressed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A per-conversation worker came up
    WorkerStarted {
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A per-conversation worker exited
    WorkerStopped {
        conversation_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for memory events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<MemoryEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: MemoryEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<MemoryEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(MemoryEvent::PinCreated {
            conversation_id: "c1".into(),
            pin_id: "p1".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            MemoryEvent::PinCreated { pin_id, .. } => assert_eq!(pin_id, "p1"),
            _ => panic!("Expected PinCreated event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(MemoryEvent::WorkerStopped {
            conversation_id: "c1".into(),
            reason: "idle".into(),
            timestamp: Utc::now(),
        });
    }
}
