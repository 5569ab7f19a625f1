//! Per-conversation write locks.
//!
//! Stores move working memory as one document, so two writers doing
//! load-modify-save on the same conversation would lose one update. The
//! commit path (head and tail) and the compression worker (window and pins)
//! both take the conversation's lock around their load-modify-save. LLM calls
//! happen outside the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard held while a conversation's working memory is being rewritten.
pub type ConversationGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to one conversation.
    pub async fn acquire(&self, conversation_id: &str) -> ConversationGuard {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(conversation_id.to_string())
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry for a conversation that was cleared.
    pub fn forget(&self, conversation_id: &str) {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(conversation_id);
    }

    /// Drop entries nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = locks.len();
        // The map's own reference is the only one left.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_conversation_is_exclusive() {
        let locks = Arc::new(ConversationLocks::new());
        let guard = locks.acquire("c1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("c1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_conversations_do_not_block() {
        let locks = ConversationLocks::new();
        let _a = locks.acquire("c1").await;
        let _b = locks.acquire("c2").await;
        assert_eq!(locks.len(), 2);

        locks.forget("c1");
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = ConversationLocks::new();
        drop(locks.acquire("idle").await);
        let held = locks.acquire("busy").await;

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
