//! Turning raw results into conversational text.

use std::sync::Arc;

use rmcp::model::{
    CallToolResult, GetPromptResult, JsonObject, PromptMessageContent, PromptMessageRole,
    ReadResourceResult, ResourceContents,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::gate::ExecutionResult;
use crate::conversation::ConversationTurn;
use crate::llm::{ChatMessage, LanguageModel};
use crate::mcp::ToolResultExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SynthesisStrategy {
    /// Format the payload directly.
    #[serde(rename = "deterministic")]
    Deterministic,
    /// Ask the model to narrate the result.
    #[default]
    #[serde(rename = "model", alias = "modelAssisted")]
    ModelAssisted,
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Deterministic rendering of a tool result.
///
/// Error-flagged results always render as a failure quoting the remote text.
pub fn render_tool_output(tool_name: &str, output: &CallToolResult, arguments: &JsonObject) -> String {
    if output.is_error() {
        return format!(
            "Tool \"{}\" failed: {}",
            tool_name,
            output.first_text().unwrap_or("Unknown error")
        );
    }

    if let Some(text) = output.first_text() {
        return match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => format!(
                "Tool \"{}\" executed successfully. Found {} items:\n\n{}",
                tool_name,
                items.len(),
                pretty(&Value::Array(items.clone()))
            ),
            Ok(data @ Value::Object(_)) => format!(
                "Tool \"{}\" executed successfully:\n\n{}",
                tool_name,
                pretty(&data)
            ),
            _ => format!("Tool \"{}\" executed successfully:\n\n{}", tool_name, text),
        };
    }

    if let Some(structured) = &output.structured_content {
        return format!(
            "Tool \"{}\" executed successfully:\n\n{}",
            tool_name,
            pretty(structured)
        );
    }

    format!(
        "Tool \"{}\" executed successfully with arguments: {}",
        tool_name,
        Value::Object(arguments.clone())
    )
}

/// Deterministic rendering of a resource read; only the first entry is shown.
pub fn render_resource_output(output: &ReadResourceResult) -> String {
    match output.contents.first() {
        Some(ResourceContents::TextResourceContents {
            mime_type, text, ..
        }) => {
            let is_json = mime_type.as_deref() == Some("application/json");
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Array(items)) if is_json => format!(
                    "Resource contains {} items:\n\n{}",
                    items.len(),
                    pretty(&Value::Array(items.clone()))
                ),
                Ok(data) if is_json => format!("Resource content:\n\n{}", pretty(&data)),
                _ => format!("Resource content:\n\n{}", text),
            }
        }
        Some(ResourceContents::BlobResourceContents {
            uri,
            mime_type,
            blob,
            ..
        }) => format!(
            "Resource {} is binary ({}, {} bytes encoded)",
            uri,
            mime_type.as_deref().unwrap_or("unknown type"),
            blob.len()
        ),
        None => "Resource content not available.".to_string(),
    }
}

/// Deterministic rendering of a fetched prompt.
pub fn render_prompt_output(output: &GetPromptResult) -> String {
    let mut lines = Vec::new();
    if let Some(description) = &output.description {
        lines.push(description.clone());
        lines.push(String::new());
    }
    for message in &output.messages {
        let role = match message.role {
            PromptMessageRole::User => "user",
            PromptMessageRole::Assistant => "assistant",
        };
        let text = match &message.content {
            PromptMessageContent::Text { text } => text.as_str(),
            _ => "[non-text content]",
        };
        lines.push(format!("{}: {}", role, text));
    }
    if output.messages.is_empty() {
        lines.push("Prompt has no messages.".to_string());
    }
    lines.join("\n")
}

pub struct ResponseSynthesizer {
    strategy: SynthesisStrategy,
    model: Arc<dyn LanguageModel>,
    system_prompt: String,
}

impl ResponseSynthesizer {
    pub fn new(
        strategy: SynthesisStrategy,
        model: Arc<dyn LanguageModel>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            strategy,
            model,
            system_prompt: system_prompt.into(),
        }
    }

    /// Reply to `user_message` given an executed tool. Never fails: model
    /// problems fall back to the deterministic rendering.
    pub async fn synthesize(
        &self,
        user_message: &str,
        result: &ExecutionResult,
        history: &[ConversationTurn],
    ) -> String {
        if self.strategy == SynthesisStrategy::Deterministic || result.output.is_error() {
            return result.rendered.clone();
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.tool_context_prompt(user_message, result)));
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(user_message));

        match self.model.chat(&messages).await {
            Ok(reply) if !reply.trim().is_empty() => {
                debug!(reply = %reply, "Synthesized tool response");
                reply
            }
            Ok(_) => {
                warn!("Model returned an empty synthesis, using formatted result");
                result.rendered.clone()
            }
            Err(e) => {
                warn!("Response synthesis failed, using formatted result: {:#}", e);
                result.rendered.clone()
            }
        }
    }

    fn tool_context_prompt(&self, user_message: &str, result: &ExecutionResult) -> String {
        let raw = serde_json::to_value(&result.output)
            .map(|v| pretty(&v))
            .unwrap_or_else(|_| result.rendered.clone());

        format!(
            r#"{system}

=== Tool Execution Result ===
Tool: {tool} (server: {server})
Arguments: {arguments}
Result: {raw}
=== End Tool Result ===

A tool has been automatically executed based on the user's request. The tool execution result is provided above.

Your task is to:
1. Analyze the tool execution result
2. Provide a clear, helpful response to the user based on the tool output
3. Explain what was accomplished and present the results clearly

The user asked: "{user_message}""#,
            system = self.system_prompt,
            tool = result.tool_name,
            server = result.server,
            arguments = Value::Object(result.arguments.clone()),
        )
    }
}
