//! Storage traits — the durable collaborators of the memory engine.
//!
//! Three stores, three lifetimes:
//! - [`ArchiveStore`]: append-only log of every committed exchange. Never
//!   compressed, the source of truth for recovery.
//! - [`WorkingMemoryStore`]: the current bounded view of each conversation.
//! - [`TaskQueue`]: per-conversation FIFO of pending compression work.
//!
//! Implementations: in-memory (for testing), JSONL file, SQLite.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{QueueError, StorageError};
use crate::exchange::Exchange;
use crate::message::Message;
use crate::pin::Pin;
use crate::task::CompressionTask;
use crate::working_memory::WorkingMemory;

/// Key prefix for per-conversation task queues in shared namespaces.
pub const QUEUE_KEY_PREFIX: &str = "recall:wm:queue:";

/// The queue key for a conversation.
pub fn queue_key(conversation_id: &str) -> String {
    format!("{QUEUE_KEY_PREFIX}{conversation_id}")
}

/// Append-only, chronologically ordered log of committed exchanges.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Append an exchange. Failures must surface; archival never fails silently.
    async fn append(&self, key: &str, exchange: &Exchange) -> Result<(), StorageError>;

    /// Every exchange under `key`, oldest first.
    async fn get_all(&self, key: &str) -> Result<Vec<Exchange>, StorageError>;

    /// A page of exchanges, oldest first.
    async fn get_range(
        &self,
        key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Exchange>, StorageError>;

    async fn count(&self, key: &str) -> Result<usize, StorageError>;

    async fn clear(&self, key: &str) -> Result<(), StorageError>;
}

/// Persistence for [`WorkingMemory`].
///
/// `load`/`save` move the whole value. The partition accessors are provided
/// in terms of them; backends with finer-grained storage may override them.
#[async_trait]
pub trait WorkingMemoryStore: Send + Sync {
    fn name(&self) -> &str;

    /// Load the working memory, or an empty one if none was saved yet.
    async fn load(&self, conversation_id: &str) -> Result<WorkingMemory, StorageError>;

    async fn save(&self, memory: &WorkingMemory) -> Result<(), StorageError>;

    async fn clear(&self, conversation_id: &str) -> Result<(), StorageError>;

    /// Rebuild head and tail from archived history and save the result.
    /// Used for disaster recovery, not normal operation.
    async fn recover(
        &self,
        conversation_id: &str,
        history: Vec<Exchange>,
        head_size: usize,
        tail_size: usize,
    ) -> Result<WorkingMemory, StorageError> {
        let memory = WorkingMemory::from_history(conversation_id, history, head_size, tail_size);
        self.save(&memory).await?;
        Ok(memory)
    }

    // ── Head ──

    async fn set_head(
        &self,
        conversation_id: &str,
        exchange: Exchange,
        max_size: usize,
    ) -> Result<bool, StorageError> {
        let mut memory = self.load(conversation_id).await?;
        let added = memory.set_head(exchange, max_size);
        if added {
            self.save(&memory).await?;
        }
        Ok(added)
    }

    async fn get_head(&self, conversation_id: &str) -> Result<Vec<Exchange>, StorageError> {
        Ok(self.load(conversation_id).await?.head().iter().cloned().collect())
    }

    // ── Tail ──

    async fn add_to_tail(
        &self,
        conversation_id: &str,
        exchange: Exchange,
        max_size: usize,
    ) -> Result<Option<Exchange>, StorageError> {
        let mut memory = self.load(conversation_id).await?;
        let evicted = memory.add_to_tail(exchange, max_size);
        self.save(&memory).await?;
        Ok(evicted)
    }

    async fn get_tail(&self, conversation_id: &str) -> Result<Vec<Exchange>, StorageError> {
        Ok(self.load(conversation_id).await?.tail().iter().cloned().collect())
    }

    // ── Rolling window ──

    async fn add_to_window(
        &self,
        conversation_id: &str,
        message: Message,
    ) -> Result<(), StorageError> {
        let mut memory = self.load(conversation_id).await?;
        memory.add_to_rolling_window(message);
        self.save(&memory).await
    }

    async fn get_window(&self, conversation_id: &str) -> Result<Vec<Message>, StorageError> {
        Ok(self.load(conversation_id).await?.rolling_window().to_vec())
    }

    async fn set_window(
        &self,
        conversation_id: &str,
        messages: Vec<Message>,
    ) -> Result<(), StorageError> {
        let mut memory = self.load(conversation_id).await?;
        memory.set_rolling_window(messages);
        self.save(&memory).await
    }

    async fn clear_window(&self, conversation_id: &str) -> Result<(), StorageError> {
        let mut memory = self.load(conversation_id).await?;
        memory.clear_rolling_window();
        self.save(&memory).await
    }

    // ── Pins ──

    async fn add_pin(&self, conversation_id: &str, pin: Pin) -> Result<(), StorageError> {
        let mut memory = self.load(conversation_id).await?;
        memory.add_pin(pin);
        self.save(&memory).await
    }

    async fn invalidate_pin(
        &self,
        conversation_id: &str,
        pin_id: &str,
    ) -> Result<bool, StorageError> {
        let mut memory = self.load(conversation_id).await?;
        let changed = memory.invalidate_pin(pin_id);
        if changed {
            self.save(&memory).await?;
        }
        Ok(changed)
    }

    async fn get_active_pins(&self, conversation_id: &str) -> Result<Vec<Pin>, StorageError> {
        let memory = self.load(conversation_id).await?;
        Ok(memory.active_pins().into_iter().cloned().collect())
    }

    async fn get_all_pins(&self, conversation_id: &str) -> Result<Vec<Pin>, StorageError> {
        Ok(self.load(conversation_id).await?.pins().to_vec())
    }

    async fn delete_pin(&self, conversation_id: &str, pin_id: &str) -> Result<bool, StorageError> {
        let mut memory = self.load(conversation_id).await?;
        let removed = memory.remove_pin(pin_id);
        if removed {
            self.save(&memory).await?;
        }
        Ok(removed)
    }
}

/// Durable per-conversation FIFO of compression tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Push a task onto the tail of the conversation's queue.
    async fn push(&self, task: &CompressionTask) -> Result<(), QueueError>;

    /// Pop from the head of the conversation's queue, waiting up to `timeout`.
    /// `Ok(None)` means the wait expired with nothing to take.
    async fn pop(
        &self,
        conversation_id: &str,
        timeout: Duration,
    ) -> Result<Option<CompressionTask>, QueueError>;

    /// Number of tasks waiting for the conversation.
    async fn len(&self, conversation_id: &str) -> Result<usize, QueueError>;
}
