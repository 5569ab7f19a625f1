//! Pinned facts: long-lived statements extracted from the conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinStatus {
    #[default]
    Active,
    Invalidated,
}

/// A declarative fact worth keeping for the whole conversation.
///
/// Pins are soft-invalidated when a later exchange contradicts them and only
/// disappear when aggregation replaces the whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    /// Clamped to `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub source_message_ids: Vec<String>,
    #[serde(default)]
    pub status: PinStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pin {
    pub fn new(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            content: content.into(),
            confidence: if confidence.is_nan() { 1.0 } else { confidence.clamp(0.0, 1.0) },
            source_message_ids: Vec::new(),
            status: PinStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a source message id, ignoring duplicates.
    pub fn add_source(&mut self, message_id: impl Into<String>) {
        let id = message_id.into();
        if !self.source_message_ids.contains(&id) {
            self.source_message_ids.push(id);
        }
    }

    pub fn with_sources<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            self.add_source(id);
        }
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == PinStatus::Active
    }

    pub fn invalidate(&mut self) {
        self.status = PinStatus::Invalidated;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pin_is_active() {
        let pin = Pin::new("c1", "User prefers metric units", 0.9);
        assert!(pin.is_active());
        assert_eq!(pin.conversation_id, "c1");
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(Pin::new("c", "x", 3.5).confidence, 1.0);
        assert_eq!(Pin::new("c", "x", -1.0).confidence, 0.0);
        assert_eq!(Pin::new("c", "x", f64::NAN).confidence, 1.0);
    }

    #[test]
    fn sources_are_deduplicated() {
        let pin = Pin::new("c", "x", 1.0).with_sources(["a", "b", "a"]);
        assert_eq!(pin.source_message_ids, vec!["a", "b"]);
    }

    #[test]
    fn invalidate_flips_status() {
        let mut pin = Pin::new("c", "x", 1.0);
        pin.invalidate();
        assert_eq!(pin.status, PinStatus::Invalidated);
        assert!(pin.updated_at >= pin.created_at);
    }
}
