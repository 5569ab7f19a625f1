//! Built-in system prompts for the compression strategies.
//!
//! Each strategy sends one system prompt and one user message. Operators can
//! replace the system prompt per strategy through `[compression.prompts]`;
//! a blank override falls back to the built-in text.

use recall_config::{PromptOverrides, StrategyKind};

pub const PIN_JUDGMENT_PROMPT: &str = r#"You are an expert conversation analyst. Decide whether one conversation round (a user message plus the assistant reply) should be pinned for long-term retention, and whether it negates or corrects one of the historical pins.

You receive the current round (current_messages) and, when there are any, the historical pins (historical_pins).

Pin when the round:
* states a clear, stable fact or constraint that will not change
* has a lasting effect on every future reply
* confirms or refutes an earlier conclusion
* expresses an explicit user preference, requirement, clarification, or correction

Do not pin when the round is:
* exploratory or temporary
* only meaningful in its immediate context
* derivable from other information
* a greeting or small talk
* dominated by tool calls or intermediate lookups

If shouldPin is true you MUST provide pinContent:
* one concise declarative sentence holding the core fact, constraint, or decision
* no reasoning or explanation
* third person, objective ("The user prefers PostgreSQL", not "I like PostgreSQL")

Reply with this JSON object only, without any extra text or markdown:
{
    "shouldPin": true/false,
    "reason": "one-sentence justification",
    "pinContent": "the extracted statement, or an empty string when shouldPin is false",
    "confidence": 0.9,
    "negatesPinId": "ID of the historical pin this round invalidates, or null"
}

Example, should pin:
{
    "shouldPin": true,
    "reason": "The user stated a firm technology choice",
    "pinContent": "The project must use PostgreSQL 16",
    "confidence": 0.95,
    "negatesPinId": null
}

Example, should not pin:
{
    "shouldPin": false,
    "reason": "Exploratory question without a conclusion",
    "pinContent": "",
    "confidence": 0.8,
    "negatesPinId": null
}"#;

pub const CURRENT_ROUND_PROMPT: &str = "You are an expert at content compression. Compress one conversation round \
(a user message plus the assistant reply) into concise factual statements.\n\n\
Requirements:\n\
- Use declarative sentences\n\
- Keep only confirmed facts and clear conclusions\n\
- Remove reasoning, decorative language, and tentative or exploratory content\n\
- Output plain text, no markdown or JSON\n\
- Keep every detail needed for future reference";

pub const HISTORY_PROMPT: &str = "You are an expert at conversation summarization. Summarize the historical \
conversation messages into concise factual statements.\n\n\
Requirements:\n\
- Use objective declarative sentences\n\
- Keep only facts, decisions, and conclusions\n\
- Do not introduce new inferences\n\
- Output plain text, no markdown or JSON\n\
- Keep every detail needed for future reference";

pub const PIN_AGGREGATION_PROMPT: &str = "You are an expert at consolidating information. Merge several pinned \
facts into one consolidated pin.\n\n\
Requirements:\n\
- Extract the core constraints and confirmed conclusions\n\
- Identify long-lived user preferences and preconditions\n\
- Merge related information and drop duplicates\n\
- Output plain text, no markdown or JSON\n\
- Keep every detail needed for future reference";

/// The built-in prompt for a strategy.
pub fn default_prompt(kind: StrategyKind) -> &'static str {
    match kind {
        StrategyKind::PinJudgment => PIN_JUDGMENT_PROMPT,
        StrategyKind::CurrentRoundSummarization => CURRENT_ROUND_PROMPT,
        StrategyKind::HistorySummarization => HISTORY_PROMPT,
        StrategyKind::PinAggregation => PIN_AGGREGATION_PROMPT,
    }
}

/// The resolved system prompt for each strategy.
#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    overrides: PromptOverrides,
}

impl PromptSet {
    pub fn new(overrides: PromptOverrides) -> Self {
        Self { overrides }
    }

    pub fn get(&self, kind: StrategyKind) -> &str {
        self.overrides.get(kind).unwrap_or_else(|| default_prompt(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_overrides() {
        let prompts = PromptSet::default();
        for kind in StrategyKind::ALL {
            assert_eq!(prompts.get(kind), default_prompt(kind));
        }
    }

    #[test]
    fn override_replaces_one_strategy() {
        let prompts = PromptSet::new(PromptOverrides {
            history_summarization: Some("Summarize tersely.".into()),
            ..Default::default()
        });
        assert_eq!(prompts.get(StrategyKind::HistorySummarization), "Summarize tersely.");
        assert_eq!(prompts.get(StrategyKind::PinJudgment), PIN_JUDGMENT_PROMPT);
    }

    #[test]
    fn blank_override_falls_back() {
        let prompts = PromptSet::new(PromptOverrides {
            pin_aggregation: Some("   ".into()),
            ..Default::default()
        });
        assert_eq!(prompts.get(StrategyKind::PinAggregation), PIN_AGGREGATION_PROMPT);
    }

    #[test]
    fn judgment_prompt_names_every_field() {
        for field in ["shouldPin", "reason", "pinContent", "confidence", "negatesPinId"] {
            assert!(PIN_JUDGMENT_PROMPT.contains(field), "missing {field}");
        }
    }
}
