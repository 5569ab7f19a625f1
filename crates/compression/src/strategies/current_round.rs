//! Current-round summarization for exchanges evicted from the tail.

use async_trait::async_trait;
use recall_config::StrategyKind;
use recall_core::token::estimate_exchange_tokens;
use recall_core::{CompressionResult, Exchange, Message, WorkingMemory};
use tracing::{debug, info, warn};

use super::CompressionStrategy;
use crate::llm::CompressionLlm;

pub const CURRENT_ROUND_PREFIX: &str = "[Current round summary] ";

pub struct CurrentRoundSummarization {
    llm: CompressionLlm,
    prompt: String,
    token_threshold: usize,
}

impl CurrentRoundSummarization {
    pub fn new(llm: CompressionLlm, prompt: impl Into<String>, token_threshold: usize) -> Self {
        Self {
            llm,
            prompt: prompt.into(),
            token_threshold,
        }
    }

    pub fn build_request(exchange: &Exchange) -> String {
        let mut text = String::new();
        if let Some(user) = &exchange.user {
            text.push_str(&format!("User: {}\n\n", user.text_content()));
        }
        if let Some(assistant) = &exchange.assistant {
            text.push_str(&format!("Assistant: {}\n", assistant.text_content()));
        }
        if !exchange.intermediates.is_empty() {
            text.push_str(&format!(
                "\n[Includes {} tool call messages]\n",
                exchange.intermediates.len()
            ));
        }
        text
    }

    fn summary_message(exchange: &Exchange, summary: &str) -> Message {
        let mut message = Message::assistant(format!("{CURRENT_ROUND_PREFIX}{summary}"))
            .with_metadata("summary", true)
            .with_metadata("summary_type", "current_round");
        if let Some(id) = exchange.user_id() {
            message = message.with_metadata("original_user_msg_id", id);
        }
        if let Some(id) = exchange.assistant_id() {
            message = message.with_metadata("original_assistant_msg_id", id);
        }
        message
    }
}

#[async_trait]
impl CompressionStrategy for CurrentRoundSummarization {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CurrentRoundSummarization
    }

    async fn compress(
        &self,
        conversation_id: &str,
        _memory: &WorkingMemory,
        exchange: Option<&Exchange>,
    ) -> CompressionResult {
        let Some(evicted) = exchange.filter(|e| e.is_complete()) else {
            debug!(conversation_id, "No complete evicted exchange, skipping current round summarization");
            return CompressionResult::none();
        };

        let tokens = estimate_exchange_tokens(evicted);
        if tokens <= self.token_threshold {
            debug!(conversation_id, tokens, threshold = self.token_threshold, "Evicted exchange under threshold, keeping verbatim");
            return CompressionResult::none();
        }

        info!(conversation_id, tokens, threshold = self.token_threshold, "Summarizing evicted exchange");

        match self.llm.ask(&self.prompt, Self::build_request(evicted)).await {
            Ok(summary) if !summary.trim().is_empty() => {
                let message = Self::summary_message(evicted, summary.trim());
                CompressionResult::summarized(message, 1)
            }
            Ok(_) => {
                warn!(conversation_id, "Empty current round summary, keeping verbatim");
                CompressionResult::none()
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "Current round summarization failed");
                CompressionResult::none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::Role;
    use recall_providers::ScriptedProvider;
    use std::sync::Arc;

    fn strategy(replies: &[&str], threshold: usize) -> (CurrentRoundSummarization, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(replies.iter().copied()));
        let llm = CompressionLlm::new(provider.clone(), "mock", 0.0);
        (CurrentRoundSummarization::new(llm, "compress", threshold), provider)
    }

    fn long_exchange() -> Exchange {
        Exchange::of(
            Message::user("Explain the borrow checker in depth ".repeat(20)),
            Message::assistant("The borrow checker enforces aliasing rules ".repeat(40)),
        )
        .with_intermediate(Message::tool("docs lookup result"))
    }

    #[tokio::test]
    async fn below_threshold_is_noop_without_a_call() {
        let (s, provider) = strategy(&["unused"], 10_000);
        let ex = long_exchange();
        let result = s.compress("c1", &WorkingMemory::new("c1"), Some(&ex)).await;
        assert!(!result.compressed);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn above_threshold_produces_tagged_summary() {
        let (s, _) = strategy(&["The user asked about borrowing; aliasing XOR mutation."], 50);
        let ex = long_exchange();
        let result = s.compress("c1", &WorkingMemory::new("c1"), Some(&ex)).await;

        assert!(result.compressed);
        assert_eq!(result.compressed_count, 1);
        let summary = result.summary.unwrap();
        assert_eq!(summary.role, Role::Assistant);
        assert!(summary.text_content().starts_with(CURRENT_ROUND_PREFIX));
        assert!(summary.is_summary());
        assert_eq!(summary.metadata["summary_type"], "current_round");
        assert_eq!(summary.metadata["original_user_msg_id"], ex.user_id().unwrap());
        assert_eq!(
            summary.metadata["original_assistant_msg_id"],
            ex.assistant_id().unwrap()
        );
    }

    #[tokio::test]
    async fn exactly_at_threshold_is_kept() {
        let ex = long_exchange();
        let tokens = estimate_exchange_tokens(&ex);
        let (s, provider) = strategy(&["unused"], tokens);
        let result = s.compress("c1", &WorkingMemory::new("c1"), Some(&ex)).await;
        assert!(!result.compressed);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn failure_is_noop() {
        let (s, _) = strategy(&[], 1);
        let result = s.compress("c1", &WorkingMemory::new("c1"), Some(&long_exchange())).await;
        assert_eq!(result, CompressionResult::none());
    }

    #[test]
    fn request_mentions_tool_traffic() {
        let text = CurrentRoundSummarization::build_request(&long_exchange());
        assert!(text.starts_with("User: "));
        assert!(text.contains("\nAssistant: "));
        assert!(text.ends_with("\n[Includes 1 tool call messages]\n"));
    }
}
