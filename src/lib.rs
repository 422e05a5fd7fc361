// Core modules
pub mod config;
pub mod error;
pub mod types;

// MCP plumbing
pub mod capabilities;
pub mod mcp;
pub mod mcp_client;
pub mod registry;
pub mod router;

// Chat
pub mod chat;
pub mod conversation;
pub mod llm;
pub mod orchestrator;

#[cfg(test)]
mod testing;

// Re-export key types and functions
pub use capabilities::{CapabilityAggregator, CapabilityDescriptor, CapabilityKind, Catalog};
pub use chat::{ChatCommand, ChatRepl, DebugSwitch};
pub use config::{AppConfig, ChatSettings, ConfigError, McpServiceConfig, OllamaConfig};
pub use conversation::{ConversationStore, ConversationTurn, Role};
pub use error::{ConnectionError, RegistryError, RouterError};
pub use llm::{ChatMessage, LanguageModel, OllamaClient};
pub use mcp::McpConnection;
pub use mcp_client::{connect_all, RmcpConnection};
pub use orchestrator::{ChatSession, SynthesisStrategy, TurnOutcome};
pub use registry::ServerRegistry;
pub use router::CallRouter;
pub use types::{ModelName, QualifiedName, ServerName};
