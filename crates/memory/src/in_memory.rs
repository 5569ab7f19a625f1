//! In-memory backends for tests and ephemeral sessions.
//!
//! The task queue stores tasks in their serialized form so that the same
//! encode/decode path runs here as in the durable backends.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recall_core::error::{QueueError, StorageError};
use recall_core::storage::{ArchiveStore, TaskQueue, WorkingMemoryStore};
use recall_core::{CompressionTask, Exchange, WorkingMemory};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::debug;

use crate::{is_expired, page};

// ── Archive ───────────────────────────────────────────────────────────────

/// An append-only archive held in a map of vectors.
#[derive(Default)]
pub struct InMemoryArchive {
    entries: Arc<RwLock<HashMap<String, Vec<Exchange>>>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArchiveStore for InMemoryArchive {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, key: &str, exchange: &Exchange) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(exchange.clone());
        Ok(())
    }

    async fn get_all(&self, key: &str) -> Result<Vec<Exchange>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn get_range(
        &self,
        key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Exchange>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .map(|list| page(list, offset, limit))
            .unwrap_or_default())
    }

    async fn count(&self, key: &str) -> Result<usize, StorageError> {
        Ok(self.entries.read().await.get(key).map_or(0, Vec::len))
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// ── Working memory ────────────────────────────────────────────────────────

/// Working memories keyed by conversation id.
#[derive(Default)]
pub struct InMemoryWorkingMemoryStore {
    memories: Arc<RwLock<HashMap<String, WorkingMemory>>>,
    ttl: Option<Duration>,
}

impl InMemoryWorkingMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat memories untouched for longer than `ttl` as gone.
    pub fn with_expiry(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl WorkingMemoryStore for InMemoryWorkingMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, conversation_id: &str) -> Result<WorkingMemory, StorageError> {
        let mut memories = self.memories.write().await;
        match memories.get(conversation_id) {
            Some(memory) if is_expired(memory, self.ttl) => {
                debug!(conversation_id, "Working memory expired");
                memories.remove(conversation_id);
                Ok(WorkingMemory::new(conversation_id))
            }
            Some(memory) => Ok(memory.clone()),
            None => Ok(WorkingMemory::new(conversation_id)),
        }
    }

    async fn save(&self, memory: &WorkingMemory) -> Result<(), StorageError> {
        self.memories
            .write()
            .await
            .insert(memory.conversation_id().to_string(), memory.clone());
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StorageError> {
        self.memories.write().await.remove(conversation_id);
        Ok(())
    }
}

// ── Task queue ────────────────────────────────────────────────────────────

/// Per-conversation FIFO queues with blocking pop.
#[derive(Default)]
pub struct InMemoryTaskQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Notify,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_pop(&self, conversation_id: &str) -> Result<Option<CompressionTask>, QueueError> {
        let payload = {
            let mut queues = self.queues.lock().await;
            let Some(queue) = queues.get_mut(conversation_id) else {
                return Ok(None);
            };
            let payload = queue.pop_front();
            if queue.is_empty() {
                queues.remove(conversation_id);
            }
            payload
        };
        payload
            .map(|json| CompressionTask::from_json(&json))
            .transpose()
            .map_err(|e| QueueError::Codec(e.to_string()))
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn push(&self, task: &CompressionTask) -> Result<(), QueueError> {
        let json = task.to_json().map_err(|e| QueueError::Codec(e.to_string()))?;
        self.queues
            .lock()
            .await
            .entry(task.conversation_id.clone())
            .or_default()
            .push_back(json);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop(
        &self,
        conversation_id: &str,
        timeout: Duration,
    ) -> Result<Option<CompressionTask>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a push in between still wakes us.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.try_pop(conversation_id).await? {
                return Ok(Some(task));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self, conversation_id: &str) -> Result<usize, QueueError> {
        Ok(self
            .queues
            .lock()
            .await
            .get(conversation_id)
            .map_or(0, VecDeque::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::{Message, Pin};

    fn exchange(n: usize) -> Exchange {
        Exchange::of(
            Message::user(format!("q{n}")),
            Message::assistant(format!("a{n}")),
        )
    }

    #[tokio::test]
    async fn archive_keeps_order_per_key() {
        let archive = InMemoryArchive::new();
        for n in 0..5 {
            archive.append("k", &exchange(n)).await.unwrap();
        }
        archive.append("other", &exchange(9)).await.unwrap();

        assert_eq!(archive.count("k").await.unwrap(), 5);
        let range = archive.get_range("k", 1, 2).await.unwrap();
        assert_eq!(range[0].user.as_ref().unwrap().text_content(), "q1");
        assert_eq!(range[1].user.as_ref().unwrap().text_content(), "q2");

        archive.clear("k").await.unwrap();
        assert_eq!(archive.count("k").await.unwrap(), 0);
        assert_eq!(archive.count("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn load_missing_memory_is_empty() {
        let store = InMemoryWorkingMemoryStore::new();
        let wm = store.load("c1").await.unwrap();
        assert!(wm.is_empty());
        assert_eq!(wm.conversation_id(), "c1");
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = InMemoryWorkingMemoryStore::new();
        let mut wm = WorkingMemory::new("c1");
        wm.set_head(exchange(1), 1);
        store.save(&wm).await.unwrap();

        let loaded = store.load("c1").await.unwrap();
        assert_eq!(loaded.head().len(), 1);

        store.clear("c1").await.unwrap();
        assert!(store.load("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partition_accessors_persist() {
        let store = InMemoryWorkingMemoryStore::new();
        assert!(store.set_head("c1", exchange(1), 1).await.unwrap());
        assert!(!store.set_head("c1", exchange(2), 1).await.unwrap());
        let second = exchange(2);
        assert!(store.add_to_tail("c1", second.clone(), 1).await.unwrap().is_none());
        let evicted = store.add_to_tail("c1", exchange(3), 1).await.unwrap();
        assert_eq!(evicted, Some(second));
        assert_eq!(store.get_head("c1").await.unwrap().len(), 1);
        assert_eq!(store.get_tail("c1").await.unwrap().len(), 1);

        store.add_to_window("c1", Message::assistant("s")).await.unwrap();
        assert_eq!(store.get_window("c1").await.unwrap().len(), 1);
        store.clear_window("c1").await.unwrap();
        assert!(store.get_window("c1").await.unwrap().is_empty());

        let pin = Pin::new("c1", "fact", 1.0);
        let pin_id = pin.id.clone();
        store.add_pin("c1", pin).await.unwrap();
        assert!(store.invalidate_pin("c1", &pin_id).await.unwrap());
        assert!(store.get_active_pins("c1").await.unwrap().is_empty());
        assert_eq!(store.get_all_pins("c1").await.unwrap().len(), 1);
        assert!(store.delete_pin("c1", &pin_id).await.unwrap());
        assert!(store.get_all_pins("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recover_rebuilds_head_and_tail() {
        let store = InMemoryWorkingMemoryStore::new();
        let history: Vec<Exchange> = (1..=5).map(exchange).collect();
        let wm = store.recover("c1", history.clone(), 1, 2).await.unwrap();
        assert_eq!(wm.head()[0], history[0]);
        assert_eq!(wm.tail().len(), 2);
        assert_eq!(store.load("c1").await.unwrap().total_rounds(), 3);
    }

    #[tokio::test]
    async fn queue_is_fifo_per_conversation() {
        let queue = InMemoryTaskQueue::new();
        for n in 0..3 {
            queue
                .push(&CompressionTask::new("c1", exchange(n), None))
                .await
                .unwrap();
        }
        queue
            .push(&CompressionTask::new("c2", exchange(9), None))
            .await
            .unwrap();

        assert_eq!(queue.len("c1").await.unwrap(), 3);
        for n in 0..3 {
            let task = queue
                .pop("c1", Duration::from_millis(10))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(
                task.exchange.user.as_ref().unwrap().text_content(),
                format!("q{n}")
            );
        }
        assert_eq!(queue.len("c2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn drained_queue_is_dropped() {
        let queue = InMemoryTaskQueue::new();
        queue
            .push(&CompressionTask::new("c1", exchange(1), None))
            .await
            .unwrap();
        assert_eq!(queue.queues.lock().await.len(), 1);

        assert!(queue.pop("c1", Duration::ZERO).await.unwrap().is_some());
        assert!(queue.queues.lock().await.is_empty());
        assert_eq!(queue.len("c1").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_times_out_on_empty_queue() {
        let queue = InMemoryTaskQueue::new();
        let popped = queue.pop("c1", Duration::from_secs(10)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn blocked_pop_wakes_on_push() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop("c1", Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        queue
            .push(&CompressionTask::new("c1", exchange(1), None))
            .await
            .unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert!(popped.is_some());
    }
}
