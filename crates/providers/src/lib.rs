//! LLM Provider implementations for recall.
//!
//! All providers implement the `recall_core::Provider` trait.
//! [`from_config`] builds the provider described by `[provider]` settings.

pub mod openai_compat;
pub mod scripted;

use std::sync::Arc;

use recall_config::ProviderConfig;
use recall_core::{Provider, ProviderError};

pub use openai_compat::OpenAiCompatProvider;
pub use scripted::ScriptedProvider;

/// Build the configured provider.
///
/// Local endpoints (`localhost`, `127.0.0.1`) do not need an API key.
pub fn from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let is_local = config.api_url.contains("localhost") || config.api_url.contains("127.0.0.1");
    let api_key = match (&config.api_key, is_local) {
        (Some(key), _) => key.clone(),
        (None, true) => "local".to_string(),
        (None, false) => {
            return Err(ProviderError::NotConfigured(
                "no API key; set RECALL_API_KEY or provider.api_key".into(),
            ));
        }
    };
    let provider = OpenAiCompatProvider::new("openai", &config.api_url, api_key)?;
    Ok(Arc::new(provider))
}
