//! Compression for recall working memory.
//!
//! Keeps each conversation's working memory bounded by asking an LLM to
//! extract pins and write summaries:
//!
//! 1. **Pin judgment** turns lasting facts from an exchange into pins
//! 2. **Current-round summarization** shrinks a large exchange evicted from the tail
//! 3. **History summarization** folds an overgrown rolling window into one message
//! 4. **Pin aggregation** merges pins once there are too many
//!
//! Strategies are side-effect free; [`Pipeline`] applies their results to
//! the store in a fixed order.

pub mod judgment;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod strategies;

pub use judgment::{JudgmentError, PinVerdict, parse_judgment};
pub use llm::CompressionLlm;
pub use pipeline::Pipeline;
pub use prompts::PromptSet;
pub use strategies::{
    CompressionStrategy, CurrentRoundSummarization, HistorySummarization, PinAggregation,
    PinJudgment,
};
