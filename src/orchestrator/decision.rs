//! The model's structured decision and its lenient parser.
//!
//! Models wrap their JSON in prose or code fences and are loose about types,
//! so parsing first extracts the first balanced `{...}` object and then reads
//! each field tolerantly.

use rmcp::model::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecisionParseError;

/// Whether and how to act on a user message, as proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDecision {
    pub should_execute: bool,
    /// Bare or qualified tool name.
    pub tool_name: Option<String>,
    /// Optional hint naming the server that should own `tool_name`.
    pub server_name: Option<String>,
    pub arguments: JsonObject,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDecision {
    #[serde(default)]
    should_execute: Value,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    server_name: Option<String>,
    #[serde(default)]
    arguments: Value,
    #[serde(default)]
    confidence: Value,
    #[serde(default)]
    reasoning: Option<String>,
}

impl From<RawDecision> for IntentDecision {
    fn from(raw: RawDecision) -> Self {
        Self {
            should_execute: truthy(&raw.should_execute),
            tool_name: non_empty(raw.tool_name),
            server_name: non_empty(raw.server_name),
            arguments: match raw.arguments {
                Value::Object(map) => map,
                _ => JsonObject::new(),
            },
            confidence: clamp_confidence(&raw.confidence),
            reasoning: raw.reasoning.unwrap_or_default(),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn clamp_confidence(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
}

/// The first balanced `{...}` substring, ignoring braces inside string
/// literals. `None` when there is no opening brace or it never closes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a raw model response into a decision.
pub fn parse_decision(response: &str) -> Result<IntentDecision, DecisionParseError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(DecisionParseError::Empty);
    }
    let candidate = extract_json_object(trimmed).unwrap_or(trimmed);
    let raw: RawDecision = serde_json::from_str(candidate)
        .map_err(|e| DecisionParseError::InvalidJson(e.to_string()))?;
    Ok(raw.into())
}
