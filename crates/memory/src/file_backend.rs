//! File-based backends, persistent and human-inspectable.
//!
//! Layout under the data directory:
//!
//! ```text
//! <root>/archive/<key>.jsonl         one JSON-encoded Exchange per line
//! <root>/working_memory/<id>.json    the serialized WorkingMemory
//! ```
//!
//! Keys are sanitized into file names, so `session::abc` becomes
//! `session__abc.jsonl`. There is no file-backed task queue; pair these with
//! [`InMemoryTaskQueue`](crate::InMemoryTaskQueue).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use recall_core::error::StorageError;
use recall_core::storage::{ArchiveStore, WorkingMemoryStore};
use recall_core::{Exchange, WorkingMemory};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{is_expired, page};

/// Map an arbitrary key to a safe file stem.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StorageError::Backend(format!("Failed to create {}: {e}", dir.display())))
}

// ── Archive ───────────────────────────────────────────────────────────────

/// Append-only JSONL archive, one file per key.
pub struct FileArchive {
    dir: PathBuf,
    // Serializes appends so concurrent lines never interleave.
    write_lock: Mutex<()>,
}

impl FileArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            dir: root.into().join("archive"),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", file_stem(key)))
    }

    async fn read_all(&self, key: &str) -> Result<Vec<Exchange>, StorageError> {
        let path = self.path_for(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Exchange>(line) {
                Ok(exchange) => Some(exchange),
                Err(e) => {
                    warn!(key, error = %e, "Skipping corrupted archive line");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl ArchiveStore for FileArchive {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, key: &str, exchange: &Exchange) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(exchange)
            .map_err(|e| StorageError::Backend(format!("Failed to serialize exchange: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        ensure_dir(&self.dir).await?;
        let path = self.path_for(key);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to open {}: {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to append to {}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to flush {}: {e}", path.display())))?;
        Ok(())
    }

    async fn get_all(&self, key: &str) -> Result<Vec<Exchange>, StorageError> {
        self.read_all(key).await
    }

    async fn get_range(
        &self,
        key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Exchange>, StorageError> {
        Ok(page(&self.read_all(key).await?, offset, limit))
    }

    async fn count(&self, key: &str) -> Result<usize, StorageError> {
        Ok(self.read_all(key).await?.len())
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Backend(format!("Failed to clear archive: {e}"))),
        }
    }
}

// ── Working memory ────────────────────────────────────────────────────────

/// One JSON document per conversation, replaced atomically on save.
pub struct FileWorkingMemoryStore {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl FileWorkingMemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            dir: root.into().join("working_memory"),
            ttl: None,
        }
    }

    pub fn with_expiry(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(conversation_id)))
    }
}

#[async_trait]
impl WorkingMemoryStore for FileWorkingMemoryStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, conversation_id: &str) -> Result<WorkingMemory, StorageError> {
        let path = self.path_for(conversation_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(WorkingMemory::new(conversation_id));
            }
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let memory: WorkingMemory = serde_json::from_str(&content)
            .map_err(|e| StorageError::Corrupted(format!("{}: {e}", path.display())))?;

        if is_expired(&memory, self.ttl) {
            debug!(conversation_id, "Working memory expired");
            return Ok(WorkingMemory::new(conversation_id));
        }
        Ok(memory)
    }

    async fn save(&self, memory: &WorkingMemory) -> Result<(), StorageError> {
        ensure_dir(&self.dir).await?;
        let json = serde_json::to_string_pretty(memory)
            .map_err(|e| StorageError::Backend(format!("Failed to serialize working memory: {e}")))?;

        let path = self.path_for(memory.conversation_id());
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to replace {}: {e}", path.display())))?;
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(conversation_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Backend(format!("Failed to clear working memory: {e}"))),
        }
    }
}
