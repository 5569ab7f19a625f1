//! Units of asynchronous compression work and their outcomes.

use serde::{Deserialize, Serialize};

use crate::exchange::Exchange;
use crate::message::Message;
use crate::pin::Pin;

/// One queued unit of compression work.
///
/// Serialized as JSON when it travels through a durable queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionTask {
    pub conversation_id: String,

    /// The exchange that was just committed.
    pub exchange: Exchange,

    /// The exchange pushed out of the tail by that commit, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evicted: Option<Exchange>,
}

impl CompressionTask {
    pub fn new(
        conversation_id: impl Into<String>,
        exchange: Exchange,
        evicted: Option<Exchange>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            exchange,
            evicted,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// The outcome of one strategy invocation.
///
/// Strategies never mutate working memory. They describe what should change
/// and the pipeline applies it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressionResult {
    /// Whether the strategy acted at all.
    pub compressed: bool,

    /// A summary message replacing the compressed content.
    pub summary: Option<Message>,

    /// A new pin: a judged fact, or the aggregate replacing all pins.
    pub pin: Option<Pin>,

    /// An existing pin the new one supersedes.
    pub invalidates: Option<String>,

    /// How many units (messages or pins) were folded away.
    pub compressed_count: usize,
}

impl CompressionResult {
    /// A strategy that declined to act.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn summarized(summary: Message, compressed_count: usize) -> Self {
        Self {
            compressed: true,
            summary: Some(summary),
            compressed_count,
            ..Self::default()
        }
    }

    pub fn pinned(pin: Pin, invalidates: Option<String>) -> Self {
        Self {
            compressed: true,
            pin: Some(pin),
            invalidates,
            ..Self::default()
        }
    }

    pub fn aggregated(pin: Pin, compressed_count: usize) -> Self {
        Self {
            compressed: true,
            pin: Some(pin),
            compressed_count,
            ..Self::default()
        }
    }
}
