//! The connection capability every registered server provides.
//!
//! `McpConnection` is the seam between the routing layer and the wire
//! protocol. It speaks rmcp's model types directly; the rmcp client session
//! lives in `mcp_client` and tests plug in in-memory servers.

pub mod parser;

use async_trait::async_trait;
use rmcp::model::{
    CallToolResult, Content, GetPromptResult, JsonObject, Prompt, ReadResourceResult, Resource,
    Tool,
};

use crate::error::ConnectionError;

/// Accessors for the parts of a tool result the chat layer reads.
pub trait ToolResultExt {
    /// Whether the server flagged the result as a failure.
    fn is_error(&self) -> bool;

    /// The first text block, which is where servers put their payload.
    fn first_text(&self) -> Option<&str>;
}

impl ToolResultExt for CallToolResult {
    fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    fn first_text(&self) -> Option<&str> {
        self.content
            .iter()
            .find_map(|c| c.as_text())
            .map(|t| t.text.as_str())
    }
}

/// An error-flagged result carrying `message` as its only text block.
pub fn error_result(message: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message.into())])
}

/// A live session with one capability-providing server.
///
/// Connecting happens in the constructor of the implementation; once a value
/// exists it is considered open. Dropping the last handle closes it.
#[async_trait]
pub trait McpConnection: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<Tool>, ConnectionError>;

    async fn list_resources(&self) -> Result<Vec<Resource>, ConnectionError>;

    async fn list_prompts(&self) -> Result<Vec<Prompt>, ConnectionError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ConnectionError>;

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ConnectionError>;

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<GetPromptResult, ConnectionError>;
}
