//! # Recall Core
//!
//! Domain types, traits, and error definitions for the recall working-memory
//! engine. This crate has **no storage or transport dependencies**: it defines
//! the model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Working memory is a plain value object. Every collaborator that touches the
//! outside world (the LLM, the archive, the working-memory store, the task
//! queue) is a trait defined here with implementations in their own crates.
//! This enables:
//! - Swapping storage backends via configuration
//! - Easy testing with in-memory and scripted implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod exchange;
pub mod locks;
pub mod message;
pub mod pin;
pub mod provider;
pub mod storage;
pub mod task;
pub mod token;
pub mod working_memory;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, QueueError, Result, StorageError};
pub use event::{EventBus, MemoryEvent};
pub use exchange::Exchange;
pub use locks::{ConversationGuard, ConversationLocks};
pub use message::{ContentBlock, Message, MessageStatus, Role, ToolResultBlock, ToolUseBlock};
pub use pin::{Pin, PinStatus};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use storage::{ArchiveStore, TaskQueue, WorkingMemoryStore};
pub use task::{CompressionResult, CompressionTask};
pub use working_memory::WorkingMemory;
