//! Per-conversation session handle.

use recall_core::{Exchange, Message};
use tokio::time::Instant;

/// Prefix for archive keys.
pub const STORAGE_KEY_PREFIX: &str = "session::";

/// The open exchange for one conversation, assembled message by message
/// until it is committed.
#[derive(Debug, Clone)]
pub struct SessionContext {
    session_id: String,
    storage_key: String,
    current: Exchange,
    last_access: Instant,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            storage_key: storage_key(&session_id),
            session_id,
            current: Exchange::new(),
            last_access: Instant::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Add a message to the open exchange. User and assistant messages fill
    /// their slots, anything else becomes an intermediate.
    pub fn append_message(&mut self, message: Message) {
        self.current.push(message);
        self.touch();
    }

    pub fn current_exchange(&self) -> &Exchange {
        &self.current
    }

    /// Take the open exchange, leaving an empty one in its place.
    pub fn take_current(&mut self) -> Exchange {
        std::mem::take(&mut self.current)
    }

    pub fn clear_current(&mut self) {
        self.current = Exchange::new();
    }

    pub fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    pub fn last_access(&self) -> Instant {
        self.last_access
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_access.elapsed()
    }
}

/// The archive key for a session.
pub fn storage_key(session_id: &str) -> String {
    format!("{STORAGE_KEY_PREFIX}{session_id}")
}
