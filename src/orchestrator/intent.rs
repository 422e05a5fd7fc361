use std::sync::Arc;

use tracing::{debug, warn};

use super::decision::{parse_decision, IntentDecision};
use crate::capabilities::Catalog;
use crate::conversation::ConversationTurn;
use crate::llm::LanguageModel;

/// Asks the model whether a user message calls for a tool, and which.
pub struct IntentAnalyzer {
    model: Arc<dyn LanguageModel>,
    context_turns: usize,
}

impl IntentAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>, context_turns: usize) -> Self {
        Self {
            model,
            context_turns,
        }
    }

    /// Build the decision prompt. Only the last `context_turns` entries of
    /// `history` are included.
    pub fn build_prompt(
        &self,
        message: &str,
        catalog: &Catalog,
        history: &[ConversationTurn],
    ) -> String {
        let start = history.len().saturating_sub(self.context_turns);
        let context = history[start..]
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Analyze the user's message and determine if any available tools should be automatically executed.

User message: "{message}"

Available tools (with server information):
{tools}

Available resources (with server information):
{resources}

Recent conversation context:
{context}

Instructions:
1. Determine if the user's message clearly indicates they want to perform an action that matches one of the available tools
2. If yes, identify the most appropriate tool and extract the required parameters
3. Consider the conversation context for ambiguous references (like "that", "it", "mentioned")
4. When multiple servers have similar tools, prefer the most appropriate one based on context
5. Only suggest automatic execution if you're confident about the user's intent

Parameters in square brackets are optional; all others are required.

Respond with a JSON object in this format:
{{
  "shouldExecute": true/false,
  "toolName": "tool_name_if_should_execute",
  "serverName": "server_name_if_should_execute",
  "arguments": {{"param1": "value1", "param2": "value2"}},
  "confidence": 0.0-1.0,
  "reasoning": "explanation of why this tool should/shouldn't be executed"
}}

If shouldExecute is false, only include shouldExecute, confidence, and reasoning.
Use the tool name exactly as listed after the dash, or its bare name together with serverName."#,
            tools = catalog.render_tools(),
            resources = catalog.render_resources(),
        )
    }

    /// Run the analysis. Any failure, from the model call to parsing, yields
    /// `None`.
    pub async fn analyze(
        &self,
        message: &str,
        catalog: &Catalog,
        history: &[ConversationTurn],
    ) -> Option<IntentDecision> {
        if catalog.tools.is_empty() {
            debug!("No tools available, skipping intent analysis");
            return None;
        }

        let prompt = self.build_prompt(message, catalog, history);
        debug!(prompt = %prompt, "Analyzing user intent");

        let response = match self.model.generate(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Intent analysis request failed: {:#}", e);
                return None;
            }
        };
        debug!(response = %response.trim(), "Raw intent analysis response");

        match parse_decision(&response) {
            Ok(decision) => {
                debug!(?decision, "Parsed intent decision");
                Some(decision)
            }
            Err(e) => {
                warn!("Could not parse intent decision: {}", e);
                None
            }
        }
    }
}
