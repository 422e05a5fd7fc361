//! The per-turn pipeline: analyze intent, gate, execute, synthesize.
//!
//! A [`ChatSession`] owns the conversation and runs one user turn at a time.
//! Nothing in a turn is fatal; every failure degrades to a plain-text reply.

pub mod decision;
pub mod gate;
pub mod intent;
pub mod synthesizer;

use std::sync::Arc;

use rmcp::model::JsonObject;
use tracing::{debug, warn};

use crate::capabilities::Catalog;
use crate::config::ChatSettings;
use crate::conversation::{ConversationStore, ConversationTurn};
use crate::llm::{ChatMessage, LanguageModel};
use crate::router::CallRouter;

pub use decision::{parse_decision, IntentDecision};
pub use gate::{ExecutionGate, ExecutionResult, GateVerdict, Rejection};
pub use intent::IntentAnalyzer;
pub use synthesizer::{ResponseSynthesizer, SynthesisStrategy};

pub const APOLOGY: &str =
    "Sorry, I encountered an error while generating a response. Please try again.";

/// What a user turn produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// A tool ran and `reply` describes it.
    Executed {
        result: ExecutionResult,
        reply: String,
    },
    /// No tool ran. `rejection` is set when the model proposed one that the
    /// gate turned down.
    Replied {
        reply: String,
        rejection: Option<Rejection>,
    },
}

impl TurnOutcome {
    pub fn reply(&self) -> &str {
        match self {
            Self::Executed { reply, .. } | Self::Replied { reply, .. } => reply,
        }
    }
}

pub struct ChatSession {
    router: CallRouter,
    model: Arc<dyn LanguageModel>,
    analyzer: IntentAnalyzer,
    gate: ExecutionGate,
    synthesizer: ResponseSynthesizer,
    store: ConversationStore,
    system_prompt: String,
    context_turns: usize,
}

impl ChatSession {
    pub fn new(
        router: CallRouter,
        model: Arc<dyn LanguageModel>,
        settings: &ChatSettings,
        system_prompt: impl Into<String>,
    ) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            analyzer: IntentAnalyzer::new(model.clone(), settings.context_turns),
            gate: ExecutionGate::new(settings.confidence_threshold, router.clone()),
            synthesizer: ResponseSynthesizer::new(
                settings.synthesis,
                model.clone(),
                system_prompt.clone(),
            ),
            store: ConversationStore::new(settings.max_history),
            context_turns: settings.context_turns,
            router,
            model,
            system_prompt,
        }
    }

    pub fn router(&self) -> &CallRouter {
        &self.router
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn history(&self) -> &ConversationStore {
        &self.store
    }

    pub fn clear_history(&mut self) {
        self.store.clear();
    }

    /// Run one user turn and record both sides of it.
    pub async fn handle_message(&mut self, message: &str) -> TurnOutcome {
        let catalog = self.router.aggregator().catalog().await;
        let history = self.store.recent(self.context_turns);
        self.store.append(ConversationTurn::user(message));

        let rejection = match self.analyzer.analyze(message, &catalog, &history).await {
            Some(decision) => match self.gate.gate(&decision, &catalog).await {
                GateVerdict::Executed(result) => {
                    let reply = self.synthesizer.synthesize(message, &result, &history).await;
                    self.store.append(ConversationTurn::assistant(reply.clone()));
                    return TurnOutcome::Executed { result, reply };
                }
                GateVerdict::Rejected(rejection) => Some(rejection),
            },
            None => None,
        };

        let reply = self.plain_reply(&catalog).await;
        self.store.append(ConversationTurn::assistant(reply.clone()));
        TurnOutcome::Replied { reply, rejection }
    }

    /// Free-form reply over the whole stored conversation.
    async fn plain_reply(&self, catalog: &Catalog) -> String {
        let mut messages = Vec::with_capacity(self.store.len() + 1);
        messages.push(ChatMessage::system(self.enhanced_system_prompt(catalog)));
        messages.extend(self.store.all().map(ChatMessage::from));

        match self.model.chat(&messages).await {
            Ok(reply) => {
                debug!(reply = %reply, "Generated plain reply");
                reply
            }
            Err(e) => {
                warn!("Failed to generate reply: {:#}", e);
                APOLOGY.to_string()
            }
        }
    }

    fn enhanced_system_prompt(&self, catalog: &Catalog) -> String {
        let mut prompt = self.system_prompt.clone();
        if !catalog.tools.is_empty() {
            prompt.push_str("\n\nAvailable MCP Tools:\n");
            prompt.push_str(&catalog.render_tools());
        }
        if !catalog.resources.is_empty() {
            prompt.push_str("\n\nAvailable MCP Resources:\n");
            prompt.push_str(&catalog.render_resources());
        }
        if !catalog.tools.is_empty() {
            prompt.push_str(
                "\n\nThe tools above come from several servers (named in parentheses). \
                 Tool calls are detected and routed automatically; when none was made, \
                 answer conversationally and tell the user what you could do for them.",
            );
        }
        prompt
    }

    /// Read a resource and render it for display.
    pub async fn read_resource(&self, identifier: &str) -> String {
        match self.router.read_resource(identifier).await {
            Ok(output) => synthesizer::render_resource_output(&output),
            Err(e) => format!("Failed to read resource: {}", e),
        }
    }

    /// Fetch a prompt and render it for display.
    pub async fn get_prompt(&self, identifier: &str, arguments: Option<JsonObject>) -> String {
        match self.router.get_prompt(identifier, arguments).await {
            Ok(output) => synthesizer::render_prompt_output(&output),
            Err(e) => format!("Failed to get prompt: {}", e),
        }
    }
}
