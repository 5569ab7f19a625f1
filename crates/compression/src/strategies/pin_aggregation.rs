//! Pin aggregation: merge all active pins into one when they grow too large.

use async_trait::async_trait;
use recall_config::StrategyKind;
use recall_core::token::estimate_pins_tokens;
use recall_core::{CompressionResult, Exchange, Pin, WorkingMemory};
use tracing::{debug, info, warn};

use super::CompressionStrategy;
use crate::llm::CompressionLlm;

pub struct PinAggregation {
    llm: CompressionLlm,
    prompt: String,
    max_pin_count: usize,
    max_pin_tokens: usize,
}

impl PinAggregation {
    pub fn new(
        llm: CompressionLlm,
        prompt: impl Into<String>,
        max_pin_count: usize,
        max_pin_tokens: usize,
    ) -> Self {
        Self {
            llm,
            prompt: prompt.into(),
            max_pin_count,
            max_pin_tokens,
        }
    }

    pub fn build_request(pins: &[&Pin]) -> String {
        let mut text = String::from("Existing pins:\n\n");
        for (i, pin) in pins.iter().enumerate() {
            text.push_str(&format!("Pin #{}:\n{}\n\n", i + 1, pin.content));
        }
        text
    }
}

#[async_trait]
impl CompressionStrategy for PinAggregation {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PinAggregation
    }

    async fn compress(
        &self,
        conversation_id: &str,
        memory: &WorkingMemory,
        _exchange: Option<&Exchange>,
    ) -> CompressionResult {
        let active = memory.active_pins();
        if active.is_empty() {
            return CompressionResult::none();
        }

        let count = active.len();
        let tokens = estimate_pins_tokens(active.iter().copied());
        if count <= self.max_pin_count && tokens <= self.max_pin_tokens {
            debug!(conversation_id, count, tokens, "Pins within limits, no aggregation");
            return CompressionResult::none();
        }

        info!(
            conversation_id,
            count,
            max_count = self.max_pin_count,
            tokens,
            max_tokens = self.max_pin_tokens,
            "Aggregating pins"
        );

        let content = match self.llm.ask(&self.prompt, Self::build_request(&active)).await {
            Ok(c) => c.trim().to_string(),
            Err(e) => {
                warn!(conversation_id, error = %e, "Pin aggregation failed");
                return CompressionResult::none();
            }
        };
        if content.is_empty() {
            warn!(conversation_id, "Empty aggregated pin, skipping");
            return CompressionResult::none();
        }

        let sources = active
            .iter()
            .flat_map(|p| p.source_message_ids.iter().cloned());
        let merged = Pin::new(conversation_id, content, 1.0).with_sources(sources);
        CompressionResult::aggregated(merged, count)
    }
}
