//! The per-task compression pipeline.
//!
//! One [`CompressionTask`] runs as a fixed chain of steps:
//!
//! ```text
//! on_committed ─► pin judgment ─► (pin created?) ─► check_pin_aggregation
//! on_evicted   ─► current round summarization ─► check_history (always)
//! ```
//!
//! Every step asks its strategy what to change against a snapshot of the
//! working memory, then reloads, applies and saves under the conversation's
//! lock before the next step starts. The queue worker runs one task at a
//! time per conversation, so only the commit path (head and tail) can write
//! concurrently, and it takes the same lock.

use std::sync::Arc;

use chrono::Utc;
use recall_config::{CompressionConfig, MemoryConfig, StrategyKind};
use recall_core::error::StorageError;
use recall_core::storage::WorkingMemoryStore;
use recall_core::{CompressionTask, ConversationLocks, EventBus, Exchange, MemoryEvent};
use tracing::{debug, info};

use crate::llm::CompressionLlm;
use crate::prompts::PromptSet;
use crate::strategies::{
    CompressionStrategy, CurrentRoundSummarization, HistorySummarization, PinAggregation,
    PinJudgment,
};

pub struct Pipeline {
    store: Arc<dyn WorkingMemoryStore>,
    pin_judgment: Option<PinJudgment>,
    current_round: Option<CurrentRoundSummarization>,
    history: Option<HistorySummarization>,
    pin_aggregation: Option<PinAggregation>,
    events: Arc<EventBus>,
    locks: Arc<ConversationLocks>,
}

impl Pipeline {
    /// Build the pipeline with every strategy the configuration enables.
    pub fn new(
        store: Arc<dyn WorkingMemoryStore>,
        llm: CompressionLlm,
        memory: &MemoryConfig,
        compression: &CompressionConfig,
    ) -> Self {
        let prompts = PromptSet::new(compression.prompts.clone());
        let enabled = |kind: StrategyKind| compression.is_enabled(kind);

        let pin_judgment = enabled(StrategyKind::PinJudgment).then(|| {
            PinJudgment::new(llm.clone(), prompts.get(StrategyKind::PinJudgment))
        });
        let current_round = enabled(StrategyKind::CurrentRoundSummarization).then(|| {
            CurrentRoundSummarization::new(
                llm.clone(),
                prompts.get(StrategyKind::CurrentRoundSummarization),
                memory.current_round_token_threshold,
            )
        });
        let history = enabled(StrategyKind::HistorySummarization).then(|| {
            HistorySummarization::new(
                llm.clone(),
                prompts.get(StrategyKind::HistorySummarization),
                memory.window_max_size,
                memory.window_token_threshold,
            )
        });
        let pin_aggregation = enabled(StrategyKind::PinAggregation).then(|| {
            PinAggregation::new(
                llm.clone(),
                prompts.get(StrategyKind::PinAggregation),
                memory.max_pin_count,
                memory.max_pin_tokens,
            )
        });

        debug!(
            provider = %llm.provider_name(),
            strategies = ?compression.strategies,
            "Compression pipeline ready"
        );

        Self {
            store,
            pin_judgment,
            current_round,
            history,
            pin_aggregation,
            events: Arc::new(EventBus::default()),
            locks: Arc::new(ConversationLocks::new()),
        }
    }

    /// Publish pipeline events on a shared bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Share write locks with the commit path.
    pub fn with_locks(mut self, locks: Arc<ConversationLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Run the whole chain for one task. Both branches always run; the first
    /// storage error is returned.
    pub async fn process(&self, task: &CompressionTask) -> Result<(), StorageError> {
        let committed = self
            .on_committed(&task.conversation_id, &task.exchange)
            .await;
        let evicted = match &task.evicted {
            Some(evicted) => self.on_evicted(&task.conversation_id, evicted).await,
            None => Ok(()),
        };
        committed.and(evicted)
    }

    /// Pin judgment for a freshly committed exchange.
    pub async fn on_committed(
        &self,
        conversation_id: &str,
        exchange: &Exchange,
    ) -> Result<(), StorageError> {
        let Some(strategy) = &self.pin_judgment else {
            return Ok(());
        };

        let snapshot = self.store.load(conversation_id).await?;
        let result = strategy
            .compress(conversation_id, &snapshot, Some(exchange))
            .await;
        let Some(pin) = result.pin else {
            return Ok(());
        };

        let guard = self.locks.acquire(conversation_id).await;
        let mut memory = self.store.load(conversation_id).await?;
        if let Some(stale) = result.invalidates {
            if memory.invalidate_pin(&stale) {
                info!(conversation_id, pin_id = %stale, "Invalidated pin");
                self.events.publish(MemoryEvent::PinInvalidated {
                    conversation_id: conversation_id.to_string(),
                    pin_id: stale,
                    timestamp: Utc::now(),
                });
            }
        }

        let pin_id = pin.id.clone();
        info!(conversation_id, pin_id = %pin_id, content = %pin.content, "Created pin");
        memory.add_pin(pin);
        self.store.save(&memory).await?;
        drop(guard);

        self.events.publish(MemoryEvent::PinCreated {
            conversation_id: conversation_id.to_string(),
            pin_id,
            timestamp: Utc::now(),
        });

        self.check_pin_aggregation(conversation_id).await
    }

    /// Demote an evicted exchange into the rolling window, then re-check the
    /// window whatever the outcome.
    pub async fn on_evicted(
        &self,
        conversation_id: &str,
        evicted: &Exchange,
    ) -> Result<(), StorageError> {
        let demoted = self.demote(conversation_id, evicted).await;
        let history = self.check_history(conversation_id).await;
        demoted.and(history)
    }

    async fn demote(&self, conversation_id: &str, evicted: &Exchange) -> Result<(), StorageError> {
        let summary = match &self.current_round {
            Some(strategy) => {
                let snapshot = self.store.load(conversation_id).await?;
                strategy
                    .compress(conversation_id, &snapshot, Some(evicted))
                    .await
                    .summary
            }
            None => None,
        };

        let _guard = self.locks.acquire(conversation_id).await;
        let mut memory = self.store.load(conversation_id).await?;

        match summary {
            Some(summary) => {
                memory.add_to_rolling_window(summary);
                self.store.save(&memory).await?;
                info!(conversation_id, "Evicted exchange summarized into rolling window");
                self.events.publish(MemoryEvent::Summarized {
                    conversation_id: conversation_id.to_string(),
                    kind: "current_round".into(),
                    compressed: 1,
                    timestamp: Utc::now(),
                });
            }
            None => {
                memory.add_exchange_to_rolling_window(evicted);
                self.store.save(&memory).await?;
                debug!(conversation_id, "Evicted exchange appended verbatim");
            }
        }
        Ok(())
    }

    /// Fold the rolling window into one summary when it grew too large.
    pub async fn check_history(&self, conversation_id: &str) -> Result<(), StorageError> {
        let Some(strategy) = &self.history else {
            return Ok(());
        };

        let snapshot = self.store.load(conversation_id).await?;
        let result = strategy.compress(conversation_id, &snapshot, None).await;
        let Some(summary) = result.summary else {
            return Ok(());
        };

        let guard = self.locks.acquire(conversation_id).await;
        let mut memory = self.store.load(conversation_id).await?;
        memory.clear_rolling_window();
        memory.add_to_rolling_window(summary);
        self.store.save(&memory).await?;
        drop(guard);

        info!(conversation_id, compressed = result.compressed_count, "Rolling window summarized");
        self.events.publish(MemoryEvent::Summarized {
            conversation_id: conversation_id.to_string(),
            kind: "history".into(),
            compressed: result.compressed_count,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Replace all pins with one merged pin when they grew too large.
    pub async fn check_pin_aggregation(&self, conversation_id: &str) -> Result<(), StorageError> {
        let Some(strategy) = &self.pin_aggregation else {
            return Ok(());
        };

        let snapshot = self.store.load(conversation_id).await?;
        let result = strategy.compress(conversation_id, &snapshot, None).await;
        let Some(merged) = result.pin else {
            return Ok(());
        };

        let guard = self.locks.acquire(conversation_id).await;
        let mut memory = self.store.load(conversation_id).await?;
        memory.replace_pins(merged);
        self.store.save(&memory).await?;
        drop(guard);

        info!(conversation_id, merged = result.compressed_count, "Pins aggregated");
        self.events.publish(MemoryEvent::PinsAggregated {
            conversation_id: conversation_id.to_string(),
            merged: result.compressed_count,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
