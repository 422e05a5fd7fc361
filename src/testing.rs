//! In-memory servers and a scripted model for tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use rmcp::model::{
    AnnotateAble, CallToolResult, Content, GetPromptResult, JsonObject, Prompt, PromptMessage,
    PromptMessageRole, RawResource, ReadResourceResult, Resource, ResourceContents, Tool,
};
use serde_json::{Value, json};

use crate::capabilities::CapabilityKind;
use crate::error::ConnectionError;
use crate::llm::{ChatMessage, LanguageModel};
use crate::mcp::{McpConnection, error_result};
use crate::types::ModelName;

type ToolHandler = Box<dyn Fn(&JsonObject) -> CallToolResult + Send + Sync>;

/// One call observed by a [`MockServer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Tool { name: String, arguments: JsonObject },
    Resource { uri: String },
    Prompt { name: String, arguments: Option<JsonObject> },
}

fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

#[derive(Default)]
pub struct MockServer {
    tools: Vec<Tool>,
    handlers: HashMap<String, ToolHandler>,
    resources: Vec<(Resource, String)>,
    prompts: Vec<Prompt>,
    unsupported: Vec<CapabilityKind>,
    fail_listings: bool,
    call_error: Option<ConnectionError>,
    listing_delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tool with no parameters that echoes its arguments.
    pub fn with_tool(self, name: &str) -> Self {
        self.with_tool_schema(name, json!({"type": "object"}))
    }

    pub fn with_tool_schema(mut self, name: &str, schema: Value) -> Self {
        self.tools.push(Tool::new(
            name.to_string(),
            format!("{} tool", name),
            schema.as_object().cloned().unwrap_or_default(),
        ));
        self
    }

    pub fn with_handler(
        mut self,
        name: &str,
        handler: impl Fn(&JsonObject) -> CallToolResult + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(name.to_string(), Box::new(handler));
        self
    }

    pub fn with_resource(mut self, uri: &str, text: &str) -> Self {
        let resource = RawResource {
            mime_type: Some("text/plain".to_string()),
            ..RawResource::new(uri, text)
        };
        self.resources.push((resource.no_annotation(), text.to_string()));
        self
    }

    pub fn with_prompt(mut self, name: &str) -> Self {
        self.prompts.push(Prompt::new(name, Some(format!("{} prompt", name)), None));
        self
    }

    /// Every listing fails with a transport error.
    pub fn failing_listings(mut self) -> Self {
        self.fail_listings = true;
        self
    }

    /// `resources/list` and `resources/read` answer "method not found".
    pub fn without_resources(mut self) -> Self {
        self.unsupported.push(CapabilityKind::Resource);
        self
    }

    /// `prompts/list` and `prompts/get` answer "method not found".
    pub fn without_prompts(mut self) -> Self {
        self.unsupported.push(CapabilityKind::Prompt);
        self
    }

    /// Every call (not listing) fails with `error`.
    pub fn failing_calls(mut self, error: ConnectionError) -> Self {
        self.call_error = Some(error);
        self
    }

    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = Some(delay);
        self
    }

    /// A notes server with `create_note`, `get_note` and `get_all_notes`
    /// backed by a shared in-memory map.
    pub fn notes() -> Self {
        let notes: Arc<Mutex<BTreeMap<String, String>>> = Arc::default();
        let create = notes.clone();
        let get = notes.clone();
        let all = notes;

        Self::new()
            .with_tool_schema(
                "create_note",
                json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Note name"},
                        "content": {"type": "string", "description": "Note body"}
                    },
                    "required": ["name", "content"]
                }),
            )
            .with_tool_schema(
                "get_note",
                json!({
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                }),
            )
            .with_tool_schema("get_all_notes", json!({"type": "object", "properties": {}}))
            .with_handler("create_note", move |args| {
                let name = args.get("name").and_then(Value::as_str).unwrap_or_default();
                let content = args.get("content").and_then(Value::as_str).unwrap_or_default();
                create
                    .lock()
                    .unwrap()
                    .insert(name.to_string(), content.to_string());
                text_result(format!("Created note '{}'", name))
            })
            .with_handler("get_note", move |args| {
                let name = args.get("name").and_then(Value::as_str).unwrap_or_default();
                match get.lock().unwrap().get(name) {
                    Some(content) => {
                        text_result(json!({"name": name, "content": content}).to_string())
                    }
                    None => error_result(format!("Note '{}' not found", name)),
                }
            })
            .with_handler("get_all_notes", move |_| {
                let listing: Vec<Value> = all
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|(name, content)| json!({"name": name, "content": content}))
                    .collect();
                text_result(Value::Array(listing).to_string())
            })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    async fn check_listing(&self, kind: CapabilityKind) -> Result<(), ConnectionError> {
        if let Some(delay) = self.listing_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listings {
            return Err(ConnectionError::Transport("connection closed".to_string()));
        }
        self.check_supported(kind)
    }

    fn check_supported(&self, kind: CapabilityKind) -> Result<(), ConnectionError> {
        if self.unsupported.contains(&kind) {
            return Err(ConnectionError::MethodNotSupported(format!("{}/list", kind)));
        }
        Ok(())
    }

    fn check_call(&self) -> Result<(), ConnectionError> {
        match &self.call_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl McpConnection for MockServer {
    async fn list_tools(&self) -> Result<Vec<Tool>, ConnectionError> {
        self.check_listing(CapabilityKind::Tool).await?;
        Ok(self.tools.clone())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ConnectionError> {
        self.check_listing(CapabilityKind::Resource).await?;
        Ok(self.resources.iter().map(|(r, _)| r.clone()).collect())
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>, ConnectionError> {
        self.check_listing(CapabilityKind::Prompt).await?;
        Ok(self.prompts.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ConnectionError> {
        self.record(RecordedCall::Tool {
            name: name.to_string(),
            arguments: arguments.clone(),
        });
        self.check_call()?;

        if !self.tools.iter().any(|t| t.name == name) {
            return Err(ConnectionError::Remote {
                code: -32602,
                message: format!("Unknown tool: {}", name),
            });
        }
        match self.handlers.get(name) {
            Some(handler) => Ok(handler(&arguments)),
            None => Ok(text_result(Value::Object(arguments).to_string())),
        }
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ConnectionError> {
        self.record(RecordedCall::Resource {
            uri: uri.to_string(),
        });
        self.check_call()?;
        self.check_supported(CapabilityKind::Resource)?;

        let (resource, text) = self
            .resources
            .iter()
            .find(|(r, _)| r.uri == uri)
            .ok_or_else(|| ConnectionError::Remote {
                code: -32002,
                message: format!("Resource not found: {}", uri),
            })?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri: resource.uri.clone(),
                mime_type: resource.mime_type.clone(),
                text: text.clone(),
                meta: None,
            }],
        })
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<GetPromptResult, ConnectionError> {
        self.record(RecordedCall::Prompt {
            name: name.to_string(),
            arguments: arguments.clone(),
        });
        self.check_call()?;
        self.check_supported(CapabilityKind::Prompt)?;

        let prompt = self
            .prompts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConnectionError::Remote {
                code: -32602,
                message: format!("Unknown prompt: {}", name),
            })?;
        let args = arguments.map(Value::Object).unwrap_or(Value::Null);
        Ok(GetPromptResult {
            description: prompt.description.clone(),
            messages: vec![PromptMessage::new_text(
                PromptMessageRole::User,
                format!("Run {} with {}", name, args),
            )],
        })
    }
}

/// A language model that replays queued responses in order.
///
/// An exhausted queue answers with an error, which lets tests exercise the
/// degraded paths without extra setup.
#[derive(Default)]
pub struct ScriptedModel {
    generate: Mutex<VecDeque<Result<String, String>>>,
    chat: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    conversations: Mutex<Vec<Vec<ChatMessage>>>,
    model: Mutex<Option<ModelName>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generate(self, response: impl Into<String>) -> Self {
        self.generate.lock().unwrap().push_back(Ok(response.into()));
        self
    }

    pub fn with_generate_error(self, message: &str) -> Self {
        self.generate.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn with_chat(self, response: impl Into<String>) -> Self {
        self.chat.lock().unwrap().push_back(Ok(response.into()));
        self
    }

    pub fn with_chat_error(self, message: &str) -> Self {
        self.chat.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    /// Prompts passed to `generate`, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Message lists passed to `chat`, in order.
    pub fn conversations(&self) -> Vec<Vec<ChatMessage>> {
        self.conversations.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.generate.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted generate response")),
        }
    }

    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        self.conversations.lock().unwrap().push(messages.to_vec());
        match self.chat.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted chat response")),
        }
    }

    async fn model(&self) -> ModelName {
        self.model
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| ModelName::new("scripted"))
    }

    async fn set_model(&self, model: ModelName) {
        *self.model.lock().unwrap() = Some(model);
    }
}
