//! Ollama HTTP client.
//!
//! Only the three endpoints the chat needs are used: `/api/generate`,
//! `/api/chat` and `/api/tags` (plus `/api/pull` at startup). All requests
//! are non-streaming.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use super::{ChatMessage, LanguageModel};
use crate::types::ModelName;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

pub struct OllamaClient {
    base_url: Url,
    model: RwLock<ModelName>,
    client: Client,
}

impl OllamaClient {
    pub fn new(host: &str, model: ModelName) -> Result<Self> {
        let mut base_url =
            Url::parse(host).with_context(|| format!("Invalid Ollama host: {}", host))?;
        // `join` replaces the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        // Generation on local hardware can take minutes; only connecting is bounded.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("multi-mcp-chat/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            model: RwLock::new(model),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid Ollama endpoint {}", path))
    }

    /// Names of the models installed on the endpoint.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self.client.get(self.endpoint("api/tags")?).send().await?;

        if response.status().is_success() {
            let tags: TagsResponse = response.json().await?;
            Ok(tags.models.into_iter().map(|m| m.name).collect())
        } else {
            Err(anyhow!("Failed to list models: {}", response.status()))
        }
    }

    pub async fn pull_model(&self, model: &ModelName) -> Result<()> {
        let body = PullRequest {
            model: model.as_str(),
            stream: false,
        };
        let response = self
            .client
            .post(self.endpoint("api/pull")?)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("Failed to pull model {}: {}", model, response.status()))
        }
    }

    /// Check the endpoint is reachable and pull the current model if it is
    /// not installed yet. Returns the installed model names.
    pub async fn ensure_model(&self) -> Result<Vec<String>> {
        let models = self
            .list_models()
            .await
            .context("Ollama endpoint is not reachable")?;
        info!(models = %models.join(", "), "Connected to Ollama");

        let model = self.model().await;
        if !models.iter().any(|m| m.contains(model.as_str())) {
            info!(model = %model, "Model not installed, pulling");
            self.pull_model(&model).await?;
            info!(model = %model, "Pulled model");
        }
        Ok(models)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let model = self.model().await;
        let body = GenerateRequest {
            model: model.as_str(),
            prompt,
            stream: false,
        };
        debug!(model = %model, "Sending generate request");

        let response = self
            .client
            .post(self.endpoint("api/generate")?)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            let generated: GenerateResponse = response.json().await?;
            Ok(generated.response)
        } else {
            Err(anyhow!("Generate request failed: {}", response.status()))
        }
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let model = self.model().await;
        let body = ChatRequest {
            model: model.as_str(),
            messages,
            stream: false,
        };
        debug!(model = %model, messages = messages.len(), "Sending chat request");

        let response = self
            .client
            .post(self.endpoint("api/chat")?)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            let chat: ChatResponse = response.json().await?;
            Ok(chat.message.content)
        } else {
            Err(anyhow!("Chat request failed: {}", response.status()))
        }
    }

    async fn model(&self) -> ModelName {
        self.model.read().await.clone()
    }

    async fn set_model(&self, model: ModelName) {
        info!(model = %model, "Switched model");
        *self.model.write().await = model;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_invalid_host() {
        assert!(OllamaClient::new("not a url", ModelName::new("llama3.2")).is_err());
    }

    #[test]
    fn test_endpoint_joins_base() {
        let client = OllamaClient::new("http://localhost:11434", ModelName::new("llama3.2")).unwrap();
        assert_eq!(
            client.endpoint("api/chat").unwrap().as_str(),
            "http://localhost:11434/api/chat"
        );
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = ChatRequest {
            model: "llama3.2",
            messages: &messages,
            stream: false,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "llama3.2",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ],
                "stream": false
            })
        );
    }

    #[test]
    fn test_responses_decode() {
        let generated: GenerateResponse =
            serde_json::from_value(json!({"model": "m", "response": "{}", "done": true})).unwrap();
        assert_eq!(generated.response, "{}");

        let chat: ChatResponse = serde_json::from_value(json!({
            "message": {"role": "assistant", "content": "hello"},
            "done": true
        }))
        .unwrap();
        assert_eq!(chat.message.content, "hello");

        let tags: TagsResponse =
            serde_json::from_value(json!({"models": [{"name": "llama3.2:latest", "size": 1}]})).unwrap();
        assert_eq!(tags.models[0].name, "llama3.2:latest");
    }

    #[tokio::test]
    async fn test_set_model_switches_without_reconnecting() {
        let client = OllamaClient::new("http://localhost:11434", ModelName::new("llama3.2")).unwrap();
        client.set_model(ModelName::new("qwen2.5")).await;
        assert_eq!(client.model().await.as_str(), "qwen2.5");
    }
}
