//! History summarization: fold the whole rolling window into one message.

use async_trait::async_trait;
use recall_config::StrategyKind;
use recall_core::token::estimate_messages_tokens;
use recall_core::{CompressionResult, Exchange, Message, WorkingMemory};
use tracing::{debug, info, warn};

use super::CompressionStrategy;
use crate::llm::CompressionLlm;

pub const HISTORY_PREFIX: &str = "[History summary] ";

pub struct HistorySummarization {
    llm: CompressionLlm,
    prompt: String,
    max_size: usize,
    token_threshold: usize,
}

impl HistorySummarization {
    pub fn new(
        llm: CompressionLlm,
        prompt: impl Into<String>,
        max_size: usize,
        token_threshold: usize,
    ) -> Self {
        Self {
            llm,
            prompt: prompt.into(),
            max_size,
            token_threshold,
        }
    }

    /// Whether a window of this shape should be folded.
    pub fn needs_compression(&self, window: &[Message]) -> bool {
        !window.is_empty()
            && (window.len() > self.max_size
                || estimate_messages_tokens(window) > self.token_threshold)
    }

    pub fn build_request(window: &[Message]) -> String {
        let mut text = String::from("Historical Messages:\n\n");
        for (i, message) in window.iter().enumerate() {
            text.push_str(&format!(
                "[{}] {}: {}\n\n",
                i + 1,
                message.role.as_str().to_uppercase(),
                message.text_content()
            ));
        }
        text
    }
}

#[async_trait]
impl CompressionStrategy for HistorySummarization {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HistorySummarization
    }

    async fn compress(
        &self,
        conversation_id: &str,
        memory: &WorkingMemory,
        _exchange: Option<&Exchange>,
    ) -> CompressionResult {
        let window = memory.rolling_window();
        if !self.needs_compression(window) {
            debug!(
                conversation_id,
                window_size = window.len(),
                max_size = self.max_size,
                "Rolling window within limits"
            );
            return CompressionResult::none();
        }

        let tokens = estimate_messages_tokens(window);
        info!(
            conversation_id,
            window_size = window.len(),
            max_size = self.max_size,
            tokens,
            threshold = self.token_threshold,
            "Summarizing rolling window"
        );

        match self.llm.ask(&self.prompt, Self::build_request(window)).await {
            Ok(summary) if !summary.trim().is_empty() => {
                let message = Message::assistant(format!("{HISTORY_PREFIX}{}", summary.trim()))
                    .with_metadata("summary", true)
                    .with_metadata("summary_type", "history")
                    .with_metadata("original_message_count", window.len());
                CompressionResult::summarized(message, window.len() - 1)
            }
            Ok(_) => {
                warn!(conversation_id, "Empty history summary, window left as-is");
                CompressionResult::none()
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "History summarization failed");
                CompressionResult::none()
            }
        }
    }
}
