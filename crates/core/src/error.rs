//! Error types for the recall domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all recall operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Queue errors ---
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unusable response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Corrupted record: {0}")]
    Corrupted(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to push task for {conversation_id}: {reason}")]
    Push {
        conversation_id: String,
        reason: String,
    },

    #[error("Failed to pop task for {conversation_id}: {reason}")]
    Pop {
        conversation_id: String,
        reason: String,
    },

    #[error("Task encoding failed: {0}")]
    Codec(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn queue_error_names_the_conversation() {
        let err = Error::Queue(QueueError::Push {
            conversation_id: "conv-7".into(),
            reason: "disk full".into(),
        });
        assert!(err.to_string().contains("conv-7"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn storage_error_converts_into_top_level() {
        let err: Error = StorageError::Backend("locked".into()).into();
        assert!(matches!(err, Error::Storage(_)));
    }
}
