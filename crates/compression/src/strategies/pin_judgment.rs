//! Pin judgment: ask the model whether an exchange holds a lasting fact.

use async_trait::async_trait;
use recall_config::StrategyKind;
use recall_core::{CompressionResult, Exchange, Pin, WorkingMemory};
use tracing::{debug, info, warn};

use super::CompressionStrategy;
use crate::judgment::parse_judgment;
use crate::llm::CompressionLlm;

pub struct PinJudgment {
    llm: CompressionLlm,
    prompt: String,
}

impl PinJudgment {
    pub fn new(llm: CompressionLlm, prompt: impl Into<String>) -> Self {
        Self {
            llm,
            prompt: prompt.into(),
        }
    }

    /// The user message: the current round, then the active pins with ids
    /// so the model can name one to negate.
    pub fn build_request(exchange: &Exchange, active_pins: &[&Pin]) -> String {
        let mut text = String::from("current_messages:\n");
        if let Some(user) = &exchange.user {
            text.push_str(&format!("User: {}\n", user.text_content()));
        }
        if let Some(assistant) = &exchange.assistant {
            text.push_str(&format!("Assistant: {}\n", assistant.text_content()));
        }

        if !active_pins.is_empty() {
            text.push_str("\nhistorical_pins:\n");
            for (i, pin) in active_pins.iter().enumerate() {
                text.push_str(&format!("Pin #{} (ID: {}):\n", i + 1, pin.id));
                text.push_str(&format!("Content: {}\n", pin.content));
            }
        }
        text
    }
}

#[async_trait]
impl CompressionStrategy for PinJudgment {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PinJudgment
    }

    async fn compress(
        &self,
        conversation_id: &str,
        memory: &WorkingMemory,
        exchange: Option<&Exchange>,
    ) -> CompressionResult {
        let Some(exchange) = exchange.filter(|e| e.is_complete()) else {
            warn!(conversation_id, "No complete exchange, skipping pin judgment");
            return CompressionResult::none();
        };

        let active = memory.active_pins();
        let request = Self::build_request(exchange, &active);

        let response = match self.llm.ask(&self.prompt, request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(conversation_id, error = %e, "Pin judgment call failed");
                return CompressionResult::none();
            }
        };
        debug!(conversation_id, response = %response, "Pin judgment response");

        let judgment = match parse_judgment(&response) {
            Ok(j) => j,
            Err(e) => {
                warn!(conversation_id, error = %e, "Unparseable pin judgment");
                return CompressionResult::none();
            }
        };

        info!(
            conversation_id,
            should_pin = judgment.should_pin,
            reason = %judgment.reason,
            "Pin judgment completed"
        );

        let Some(content) = judgment.content() else {
            if judgment.should_pin {
                warn!(conversation_id, response = %response, "shouldPin=true without pinContent, no pin created");
            }
            return CompressionResult::none();
        };

        let sources = exchange.user_id().into_iter().chain(exchange.assistant_id());
        let pin = Pin::new(conversation_id, content, judgment.confidence).with_sources(sources);

        // Only an id that names an active pin is worth invalidating.
        let invalidates = judgment
            .negates_pin_id
            .filter(|id| active.iter().any(|p| &p.id == id));

        CompressionResult::pinned(pin, invalidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::Message;
    use recall_providers::ScriptedProvider;
    use std::sync::Arc;

    fn strategy(replies: &[&str]) -> (PinJudgment, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(replies.iter().copied()));
        let llm = CompressionLlm::new(provider.clone(), "mock", 0.0);
        (PinJudgment::new(llm, "judge"), provider)
    }

    fn exchange() -> Exchange {
        Exchange::of(
            Message::user("I'm allergic to peanuts"),
            Message::assistant("Noted, I'll avoid peanut recipes."),
        )
    }

    #[test]
    fn request_lists_active_pins_with_ids() {
        let pin = Pin::new("c1", "The user is vegetarian", 1.0);
        let text = PinJudgment::build_request(&exchange(), &[&pin]);
        assert!(text.starts_with("current_messages:\nUser: I'm allergic to peanuts\n"));
        assert!(text.contains("Assistant: Noted, I'll avoid peanut recipes.\n"));
        assert!(text.contains(&format!("\nhistorical_pins:\nPin #1 (ID: {}):\n", pin.id)));
        assert!(text.contains("Content: The user is vegetarian\n"));
    }

    #[test]
    fn request_without_pins_has_no_pin_section() {
        let text = PinJudgment::build_request(&exchange(), &[]);
        assert!(!text.contains("historical_pins"));
    }

    #[tokio::test]
    async fn creates_pin_with_sources() {
        let (s, provider) = strategy(&[
            r#"{"shouldPin": true, "reason": "health fact", "pinContent": "The user is allergic to peanuts", "confidence": 0.9, "negatesPinId": null}"#,
        ]);
        let ex = exchange();
        let result = s.compress("c1", &WorkingMemory::new("c1"), Some(&ex)).await;

        assert!(result.compressed);
        let pin = result.pin.unwrap();
        assert_eq!(pin.content, "The user is allergic to peanuts");
        assert_eq!(pin.confidence, 0.9);
        assert_eq!(
            pin.source_message_ids,
            vec![ex.user_id().unwrap().to_string(), ex.assistant_id().unwrap().to_string()]
        );
        assert!(result.invalidates.is_none());

        let sent = &provider.requests()[0];
        assert_eq!(sent.messages[0].text_content(), "judge");
    }

    #[tokio::test]
    async fn negation_names_an_active_pin() {
        let mut wm = WorkingMemory::new("c1");
        let old = Pin::new("c1", "The user eats peanuts", 1.0);
        let old_id = old.id.clone();
        wm.add_pin(old);

        let reply = format!(
            r#"{{"shouldPin": true, "pinContent": "The user is allergic to peanuts", "negatesPinId": "{old_id}"}}"#
        );
        let (s, _) = strategy(&[reply.as_str()]);
        let result = s.compress("c1", &wm, Some(&exchange())).await;
        assert_eq!(result.invalidates, Some(old_id));
    }

    #[tokio::test]
    async fn unknown_negation_id_is_ignored() {
        let (s, _) = strategy(&[
            r#"{"shouldPin": true, "pinContent": "fact", "negatesPinId": "no-such-pin"}"#,
        ]);
        let result = s.compress("c1", &WorkingMemory::new("c1"), Some(&exchange())).await;
        assert!(result.pin.is_some());
        assert!(result.invalidates.is_none());
    }

    #[tokio::test]
    async fn should_pin_without_content_is_noop() {
        let (s, _) = strategy(&[r#"{"shouldPin": true, "pinContent": ""}"#]);
        let result = s.compress("c1", &WorkingMemory::new("c1"), Some(&exchange())).await;
        assert_eq!(result, CompressionResult::none());
    }

    #[tokio::test]
    async fn provider_failure_is_noop() {
        let (s, _) = strategy(&[]);
        let result = s.compress("c1", &WorkingMemory::new("c1"), Some(&exchange())).await;
        assert!(!result.compressed);
    }

    #[tokio::test]
    async fn garbage_reply_is_noop() {
        let (s, _) = strategy(&["no idea"]);
        let result = s.compress("c1", &WorkingMemory::new("c1"), Some(&exchange())).await;
        assert!(!result.compressed);
    }

    #[tokio::test]
    async fn incomplete_exchange_skips_the_call() {
        let (s, provider) = strategy(&[r#"{"shouldPin": true, "pinContent": "x"}"#]);
        let mut open = Exchange::new();
        open.push(Message::user("half"));
        let result = s.compress("c1", &WorkingMemory::new("c1"), Some(&open)).await;
        assert!(!result.compressed);
        assert_eq!(provider.call_count(), 0);
    }
}
