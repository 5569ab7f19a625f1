//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~2.5 characters per token, which stays
//! conservative for mixed Latin and CJK text. Every count rounds up, so the
//! estimate is monotonic in content size. It is a budget signal, not a
//! tokenizer-accurate count.

use crate::exchange::Exchange;
use crate::message::{ContentBlock, Message};
use crate::pin::Pin;

const MESSAGE_OVERHEAD: usize = 5;
const TOOL_USE_OVERHEAD: usize = 10;
const TOOL_RESULT_OVERHEAD: usize = 8;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 2.5 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    // ceil(chars / 2.5) in integer arithmetic
    (chars * 2).div_ceil(5)
}

/// Estimate tokens for a content block.
pub fn estimate_block_tokens(block: &ContentBlock) -> usize {
    match block {
        ContentBlock::Text { text } => estimate_tokens(text),
        ContentBlock::ToolUse(tool_use) => {
            let mut tokens = TOOL_USE_OVERHEAD
                + estimate_tokens(&tool_use.name)
                + estimate_tokens(&tool_use.id);
            if !tool_use.input.is_empty() {
                let input = serde_json::Value::Object(tool_use.input.clone()).to_string();
                tokens += estimate_tokens(&input);
            }
            if let Some(content) = &tool_use.content {
                tokens += estimate_tokens(content);
            }
            tokens
        }
        ContentBlock::ToolResult(result) => {
            TOOL_RESULT_OVERHEAD
                + estimate_tokens(&result.name)
                + estimate_tokens(&result.id)
                + result.output.iter().map(estimate_block_tokens).sum::<usize>()
        }
    }
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Overhead covers the role marker, the optional sender name, and wire
/// delimiters.
pub fn estimate_message_tokens(message: &Message) -> usize {
    MESSAGE_OVERHEAD
        + estimate_tokens(message.role.as_str())
        + message.name.as_deref().map(estimate_tokens).unwrap_or(0)
        + message.content.iter().map(estimate_block_tokens).sum::<usize>()
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Estimate tokens for every message of an exchange, intermediates included.
pub fn estimate_exchange_tokens(exchange: &Exchange) -> usize {
    exchange.messages().map(estimate_message_tokens).sum()
}

/// Estimate tokens for a set of pins, each costed as a role-less message.
pub fn estimate_pins_tokens<'a, I>(pins: I) -> usize
where
    I: IntoIterator<Item = &'a Pin>,
{
    pins.into_iter()
        .map(|p| MESSAGE_OVERHEAD + estimate_tokens(&p.content))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Role, ToolResultBlock, ToolUseBlock};

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn five_chars_is_two_tokens() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn one_char_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // 5 CJK characters, 15 bytes
        assert_eq!(estimate_tokens("你好世界啊"), 2);
    }

    #[test]
    fn message_includes_overhead_and_role() {
        // 5 overhead + "user" (4 chars → 2) + "hello" (2) = 9
        let msg = Message::user("hello");
        assert_eq!(estimate_message_tokens(&msg), 9);
    }

    #[test]
    fn name_is_counted() {
        let msg = Message::user("hello").with_name("bob");
        assert_eq!(estimate_message_tokens(&msg), 11);
    }

    #[test]
    fn tool_blocks_carry_their_own_overhead() {
        let use_block = ContentBlock::ToolUse(ToolUseBlock {
            id: "id".into(),
            name: "ls".into(),
            input: serde_json::Map::new(),
            content: None,
        });
        // 10 + "ls" (1) + "id" (1)
        assert_eq!(estimate_block_tokens(&use_block), 12);

        let result_block = ContentBlock::ToolResult(ToolResultBlock {
            id: "id".into(),
            name: "ls".into(),
            output: vec![ContentBlock::text("hello")],
        });
        // 8 + 1 + 1 + 2
        assert_eq!(estimate_block_tokens(&result_block), 12);
    }

    #[test]
    fn exchange_counts_intermediates() {
        let plain = Exchange::of(Message::user("q"), Message::assistant("a"));
        let with_tool = plain
            .clone()
            .with_intermediate(Message::new(Role::Tool, "output"));
        assert!(estimate_exchange_tokens(&with_tool) > estimate_exchange_tokens(&plain));
    }

    #[test]
    fn pins_cost_overhead_plus_content() {
        let pins = vec![Pin::new("c", "hello", 1.0), Pin::new("c", "hello", 1.0)];
        assert_eq!(estimate_pins_tokens(&pins), 14);
    }
}
