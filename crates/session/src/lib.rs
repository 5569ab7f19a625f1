//! Session orchestration for recall.
//!
//! Ties storage, the compression pipeline and the per-conversation workers
//! together behind [`SessionMemory`]:
//!
//! - [`context`]: the open exchange for one session
//! - [`session`]: commit, reads, prompt assembly, recovery
//! - [`supervisor`]: one FIFO compression worker per conversation
//! - [`reaper`]: periodic removal of idle sessions from the registry
//! - [`backends`]: storage selected by configuration

pub mod backends;
pub mod context;
pub mod reaper;
pub mod session;
pub mod supervisor;

pub use backends::Backends;
pub use context::SessionContext;
pub use reaper::Reaper;
pub use session::{SessionMemory, SessionRegistry};
pub use supervisor::QueueSupervisor;
