//! SQLite backend implementing all three stores in one database.
//!
//! Tables:
//! - `archive` keeps every committed exchange in insertion order
//! - `working_memory` holds one serialized [`WorkingMemory`] per conversation
//! - `task_queue` is a FIFO of serialized compression tasks per queue key
//!
//! Popping deletes the oldest row with `DELETE ... RETURNING`, so a task is
//! handed to exactly one caller even with several processes on the same file.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use recall_core::error::{QueueError, StorageError};
use recall_core::storage::{ArchiveStore, TaskQueue, WorkingMemoryStore, queue_key};
use recall_core::{CompressionTask, Exchange, WorkingMemory};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::is_expired;

/// How often a blocked pop re-checks the table for rows pushed by other processes.
const POP_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct SqliteStore {
    pool: SqlitePool,
    ttl: Option<Duration>,
    pushed: Notify,
}

impl SqliteStore {
    /// Open (or create) a database.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StorageError::Backend(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to :memory: is its own database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let store = Self {
            pool,
            ttl: None,
            pushed: Notify::new(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Treat working memories untouched for longer than `ttl` as gone.
    pub fn with_expiry(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS archive (
                iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                storage_key  TEXT NOT NULL,
                exchange     TEXT NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("archive table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_archive_key ON archive(storage_key, iid)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(format!("archive index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS working_memory (
                conversation_id  TEXT PRIMARY KEY,
                state            TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("working_memory table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_queue (
                iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                queue_key    TEXT NOT NULL,
                payload      TEXT NOT NULL,
                enqueued_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("task_queue table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_task_queue_key ON task_queue(queue_key, iid)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(format!("task_queue index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn try_pop(&self, conversation_id: &str) -> Result<Option<CompressionTask>, QueueError> {
        let row = sqlx::query(
            r#"
            DELETE FROM task_queue
            WHERE iid = (SELECT iid FROM task_queue WHERE queue_key = ? ORDER BY iid LIMIT 1)
            RETURNING payload
            "#,
        )
        .bind(queue_key(conversation_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Pop {
            conversation_id: conversation_id.to_string(),
            reason: e.to_string(),
        })?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.try_get("payload").map_err(|e| QueueError::Pop {
            conversation_id: conversation_id.to_string(),
            reason: format!("payload column: {e}"),
        })?;
        CompressionTask::from_json(&payload)
            .map(Some)
            .map_err(|e| QueueError::Codec(e.to_string()))
    }
}

fn decode_exchange(row: &sqlx::sqlite::SqliteRow) -> Option<Exchange> {
    let json: String = match row.try_get("exchange") {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Skipping archive row without exchange column");
            return None;
        }
    };
    match serde_json::from_str(&json) {
        Ok(exchange) => Some(exchange),
        Err(e) => {
            warn!(error = %e, "Skipping corrupted archive row");
            None
        }
    }
}

// ── Archive ───────────────────────────────────────────────────────────────

#[async_trait]
impl ArchiveStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, key: &str, exchange: &Exchange) -> Result<(), StorageError> {
        let json = serde_json::to_string(exchange)
            .map_err(|e| StorageError::Backend(format!("Exchange serialization: {e}")))?;
        sqlx::query("INSERT INTO archive (storage_key, exchange, created_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(json)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("Archive insert: {e}")))?;
        Ok(())
    }

    async fn get_all(&self, key: &str) -> Result<Vec<Exchange>, StorageError> {
        let rows = sqlx::query("SELECT exchange FROM archive WHERE storage_key = ? ORDER BY iid")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("Archive read: {e}")))?;
        Ok(rows.iter().filter_map(decode_exchange).collect())
    }

    async fn get_range(
        &self,
        key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Exchange>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT exchange FROM archive WHERE storage_key = ? ORDER BY iid LIMIT ? OFFSET ?",
        )
        .bind(key)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("Archive range: {e}")))?;
        Ok(rows.iter().filter_map(decode_exchange).collect())
    }

    async fn count(&self, key: &str) -> Result<usize, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM archive WHERE storage_key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("Archive count: {e}")))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| StorageError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM archive WHERE storage_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("Archive clear: {e}")))?;
        Ok(())
    }
}

// ── Working memory ────────────────────────────────────────────────────────

#[async_trait]
impl WorkingMemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, conversation_id: &str) -> Result<WorkingMemory, StorageError> {
        let row = sqlx::query("SELECT state FROM working_memory WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("Working memory read: {e}")))?;

        let Some(row) = row else {
            return Ok(WorkingMemory::new(conversation_id));
        };
        let state: String = row
            .try_get("state")
            .map_err(|e| StorageError::QueryFailed(format!("state column: {e}")))?;
        let memory: WorkingMemory = serde_json::from_str(&state)
            .map_err(|e| StorageError::Corrupted(format!("working memory {conversation_id}: {e}")))?;

        if is_expired(&memory, self.ttl) {
            debug!(conversation_id, "Working memory expired");
            return Ok(WorkingMemory::new(conversation_id));
        }
        Ok(memory)
    }

    async fn save(&self, memory: &WorkingMemory) -> Result<(), StorageError> {
        let state = serde_json::to_string(memory)
            .map_err(|e| StorageError::Backend(format!("Working memory serialization: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO working_memory (conversation_id, state, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(conversation_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(memory.conversation_id())
        .bind(state)
        .bind(memory.updated_at().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("Working memory upsert: {e}")))?;
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM working_memory WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("Working memory clear: {e}")))?;
        Ok(())
    }
}

// ── Task queue ────────────────────────────────────────────────────────────

#[async_trait]
impl TaskQueue for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn push(&self, task: &CompressionTask) -> Result<(), QueueError> {
        let payload = task.to_json().map_err(|e| QueueError::Codec(e.to_string()))?;
        sqlx::query("INSERT INTO task_queue (queue_key, payload, enqueued_at) VALUES (?, ?, ?)")
            .bind(queue_key(&task.conversation_id))
            .bind(payload)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Push {
                conversation_id: task.conversation_id.clone(),
                reason: e.to_string(),
            })?;
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
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.try_pop(conversation_id).await? {
                return Ok(Some(task));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wake = deadline.min(now + POP_POLL_INTERVAL);
            let _ = tokio::time::timeout_at(wake, notified).await;
        }
    }

    async fn len(&self, conversation_id: &str) -> Result<usize, QueueError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM task_queue WHERE queue_key = ?")
            .bind(queue_key(conversation_id))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::Pop {
                conversation_id: conversation_id.to_string(),
                reason: e.to_string(),
            })?;
        let count: i64 = row.try_get("cnt").map_err(|e| QueueError::Pop {
            conversation_id: conversation_id.to_string(),
            reason: format!("cnt column: {e}"),
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
