//! The language model used as the decision engine and as the chat voice.

pub mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationTurn, Role};
use crate::types::ModelName;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        Self::new(turn.role, turn.content.clone())
    }
}

/// Non-streaming text generation addressed by a switchable model id.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;

    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;

    async fn model(&self) -> ModelName;

    /// Switch the model used by subsequent requests.
    async fn set_model(&self, model: ModelName);
}
