//! Storage backends for recall.
//!
//! Each backend implements the storage traits from `recall_core::storage`:
//! - [`in_memory`]: archive, working memory, and queue held in process (tests, demos)
//! - [`file_backend`]: JSONL archive and JSON working-memory files
//! - [`sqlite`]: all three in one SQLite database

pub mod file_backend;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::time::Duration;

use chrono::Utc;
use recall_core::WorkingMemory;

pub use file_backend::{FileArchive, FileWorkingMemoryStore};
pub use in_memory::{InMemoryArchive, InMemoryTaskQueue, InMemoryWorkingMemoryStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Whether a stored working memory has outlived `ttl` since its last update.
pub(crate) fn is_expired(memory: &WorkingMemory, ttl: Option<Duration>) -> bool {
    let Some(ttl) = ttl else {
        return false;
    };
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => memory.updated_at() + ttl < Utc::now(),
        Err(_) => false,
    }
}

/// Apply an offset/limit page to an ordered list.
pub(crate) fn page<T: Clone>(items: &[T], offset: usize, limit: usize) -> Vec<T> {
    items.iter().skip(offset).take(limit).cloned().collect()
}
