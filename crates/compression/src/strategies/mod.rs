//! The four compression strategies.
//!
//! | Order | Strategy | Trigger | Result |
//! |---|---|---|---|
//! | 1 | [`PinJudgment`] | every committed exchange | a new pin, maybe invalidating one |
//! | 2 | [`CurrentRoundSummarization`] | an exchange evicted from the tail | one summary message |
//! | 3 | [`HistorySummarization`] | after every step 2 | one message replacing the window |
//! | 4 | [`PinAggregation`] | after a pin is created | one pin replacing all pins |
//!
//! Strategies only read working memory. They return a [`CompressionResult`]
//! and the [`Pipeline`](crate::Pipeline) applies and persists it. Any
//! provider or decoding failure becomes [`CompressionResult::none`].

pub mod current_round;
pub mod history;
pub mod pin_aggregation;
pub mod pin_judgment;

pub use current_round::CurrentRoundSummarization;
pub use history::HistorySummarization;
pub use pin_aggregation::PinAggregation;
pub use pin_judgment::PinJudgment;

use async_trait::async_trait;
use recall_config::StrategyKind;
use recall_core::{CompressionResult, Exchange, WorkingMemory};

#[async_trait]
pub trait CompressionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Decide what to compress. `exchange` is the committed exchange for pin
    /// judgment, the evicted one for current-round summarization, and unused
    /// by the others.
    async fn compress(
        &self,
        conversation_id: &str,
        memory: &WorkingMemory,
        exchange: Option<&Exchange>,
    ) -> CompressionResult;
}
