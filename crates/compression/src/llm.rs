//! Thin wrapper around the provider for compression calls.

use std::sync::Arc;

use recall_core::error::ProviderError;
use recall_core::message::Message;
use recall_core::provider::{Provider, ProviderRequest};
use tracing::debug;

/// Sends a system prompt plus one user message and returns the reply text.
#[derive(Clone)]
pub struct CompressionLlm {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
}

impl CompressionLlm {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn ask(&self, system: &str, user: String) -> Result<String, ProviderError> {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(system), Message::user(user)],
        )
        .with_temperature(self.temperature);

        let response = self.provider.complete(request).await?;
        let text = response.message.text_content();
        debug!(provider = %self.provider.name(), chars = text.len(), "Compression call returned");
        Ok(text)
    }
}
