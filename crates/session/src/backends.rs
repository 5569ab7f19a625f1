//! Storage backends selected by configuration.

use std::sync::Arc;

use recall_config::{MemoryConfig, StorageConfig};
use recall_core::{Error, Result, StorageError};
use recall_core::storage::{ArchiveStore, TaskQueue, WorkingMemoryStore};
use recall_memory::{
    FileArchive, FileWorkingMemoryStore, InMemoryArchive, InMemoryTaskQueue,
    InMemoryWorkingMemoryStore, SqliteStore,
};
use tracing::info;

/// The three storage collaborators a session needs.
#[derive(Clone)]
pub struct Backends {
    pub archive: Arc<dyn ArchiveStore>,
    pub store: Arc<dyn WorkingMemoryStore>,
    pub queue: Arc<dyn TaskQueue>,
}

impl Backends {
    /// Everything held in process.
    pub fn in_memory(memory: &MemoryConfig) -> Self {
        Self {
            archive: Arc::new(InMemoryArchive::new()),
            store: Arc::new(InMemoryWorkingMemoryStore::new().with_expiry(memory.expiry())),
            queue: Arc::new(InMemoryTaskQueue::new()),
        }
    }

    /// Open the backend named by `storage.backend`.
    ///
    /// The file backend has no durable queue; tasks queue in process.
    pub async fn open(storage: &StorageConfig, memory: &MemoryConfig) -> Result<Self> {
        let backends = match storage.backend.as_str() {
            "memory" => Self::in_memory(memory),
            "file" => {
                let root = storage.resolved_path();
                Self {
                    archive: Arc::new(FileArchive::new(root.clone())),
                    store: Arc::new(FileWorkingMemoryStore::new(root).with_expiry(memory.expiry())),
                    queue: Arc::new(InMemoryTaskQueue::new()),
                }
            }
            "sqlite" => {
                let path = storage.resolved_path();
                let location = path.to_string_lossy().to_string();
                if !location.contains(":memory:") {
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent).await.map_err(|e| {
                            StorageError::Backend(format!(
                                "Cannot create {}: {e}",
                                parent.display()
                            ))
                        })?;
                    }
                }
                let db = Arc::new(SqliteStore::new(&location).await?.with_expiry(memory.expiry()));
                Self {
                    archive: db.clone(),
                    store: db.clone(),
                    queue: db,
                }
            }
            other => {
                return Err(Error::Config {
                    message: format!("Unknown storage backend '{other}'"),
                });
            }
        };

        info!(
            archive = backends.archive.name(),
            working_memory = backends.store.name(),
            queue = backends.queue.name(),
            "Storage ready"
        );
        Ok(backends)
    }
}
