pub mod chat;
pub mod config_cmd;
pub mod inspect;

use std::path::Path;
use std::sync::Arc;

use recall_config::RecallConfig;
use recall_core::Provider;
use recall_session::{Backends, SessionMemory};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config(path: Option<&Path>) -> Result<RecallConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => RecallConfig::load_with_env(path),
        None => RecallConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

/// Open storage and wire a session memory around `provider`.
pub async fn open_memory(
    config: &RecallConfig,
    provider: Arc<dyn Provider>,
) -> Result<SessionMemory, Box<dyn std::error::Error>> {
    let backends = Backends::open(&config.storage, &config.memory)
        .await
        .map_err(|e| format!("Failed to open storage: {e}"))?;
    Ok(SessionMemory::from_backends(backends, provider, config))
}
