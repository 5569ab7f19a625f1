//! Structured decoding of the pin-judgment reply.
//!
//! Models drift in formatting: they wrap JSON in code fences, add a sentence
//! before it, or leave out optional fields. The decoder finds the outermost
//! JSON object in the reply and deserializes it with per-field defaults, so
//! only a reply with no usable object at all is rejected.

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// The model's verdict on one exchange.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinVerdict {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub should_pin: bool,

    #[serde(default, deserialize_with = "nullable_string")]
    pub reason: String,

    #[serde(default, deserialize_with = "nullable_string")]
    pub pin_content: String,

    #[serde(default = "default_confidence", deserialize_with = "lenient_confidence")]
    pub confidence: f64,

    #[serde(default, deserialize_with = "optional_id")]
    pub negates_pin_id: Option<String>,
}

impl PinVerdict {
    /// The pin text, if the model asked for a pin and actually supplied one.
    pub fn content(&self) -> Option<&str> {
        let content = self.pin_content.trim();
        if !self.should_pin || content.is_empty() || content == "null" {
            return None;
        }
        Some(content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JudgmentError {
    #[error("no JSON object in response")]
    NoJsonObject,

    #[error("invalid judgment: {0}")]
    Invalid(String),
}

/// Decode a judgment from a raw model reply.
pub fn parse_judgment(response: &str) -> Result<PinVerdict, JudgmentError> {
    let json = extract_object(response).ok_or(JudgmentError::NoJsonObject)?;
    serde_json::from_str(json).map_err(|e| JudgmentError::Invalid(e.to_string()))
}

/// The span from the first `{` to the last `}`.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn default_confidence() -> f64 {
    1.0
}

fn nullable_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn optional_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let id = Option::<String>::deserialize(d)?;
    Ok(id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "null"))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn lenient_confidence<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(default_confidence))
}
