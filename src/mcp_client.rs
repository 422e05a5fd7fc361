// MCP client connections backed by rmcp

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, GetPromptRequestParams, GetPromptResult, JsonObject,
    Prompt, ReadResourceRequestParams, ReadResourceResult, Resource, ServerInfo, Tool,
};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{ServiceError, ServiceExt};
use tokio::process::Command;
use tracing::{info, warn};

use crate::capabilities::CapabilityKind;
use crate::config::McpServiceConfig;
use crate::error::{ConnectionError, METHOD_NOT_FOUND_ERROR_CODE};
use crate::mcp::McpConnection;
use crate::registry::ServerRegistry;
use crate::types::ServerName;

/// A live rmcp client session with one server.
///
/// Dropping the value cancels the session and, for stdio servers, ends the
/// child process.
pub struct RmcpConnection {
    name: ServerName,
    client: RunningService<RoleClient, ()>,
}

impl RmcpConnection {
    /// Open a session as described by `cfg` and complete the MCP handshake.
    pub async fn connect(cfg: &McpServiceConfig) -> Result<Self> {
        let client = match cfg {
            McpServiceConfig::Stdio {
                name,
                command,
                args,
                env,
                cwd,
            } => {
                info!(server = %name, command = %command, "Starting MCP stdio server");
                let child = TokioChildProcess::new(Command::new(command).configure(|cmd| {
                    cmd.args(args).envs(env);
                    if let Some(dir) = cwd {
                        cmd.current_dir(dir);
                    }
                }))
                .with_context(|| format!("Failed to spawn `{}` for {}", command, name))?;

                ().serve(child)
                    .await
                    .with_context(|| format!("MCP handshake with {} failed", name))?
            }
            McpServiceConfig::Http { name, url } => {
                info!(server = %name, url = %url, "Connecting to MCP HTTP server");
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());

                ().serve(transport)
                    .await
                    .with_context(|| format!("MCP handshake with {} failed", name))?
            }
        };

        let connection = Self {
            name: cfg.name().clone(),
            client,
        };
        if let Some(info) = connection.server_info() {
            info!(
                server = %connection.name,
                remote = %info.server_info.name,
                version = %info.server_info.version,
                "Connected to MCP server"
            );
        }
        Ok(connection)
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.client.peer_info()
    }

    /// Whether the server advertised `kind` during the handshake. Servers
    /// that sent no capabilities at all are given the benefit of the doubt.
    fn advertises(&self, kind: CapabilityKind) -> bool {
        let Some(info) = self.server_info() else {
            return true;
        };
        let caps = &info.capabilities;
        match kind {
            CapabilityKind::Tool => caps.tools.is_some(),
            CapabilityKind::Resource => caps.resources.is_some(),
            CapabilityKind::Prompt => caps.prompts.is_some(),
        }
    }

    fn require(&self, kind: CapabilityKind, method: &str) -> Result<(), ConnectionError> {
        if self.advertises(kind) {
            Ok(())
        } else {
            Err(ConnectionError::MethodNotSupported(method.to_string()))
        }
    }
}

fn map_service_error(method: &str, error: ServiceError) -> ConnectionError {
    match error {
        ServiceError::McpError(data) if data.code.0 == METHOD_NOT_FOUND_ERROR_CODE => {
            ConnectionError::MethodNotSupported(method.to_string())
        }
        ServiceError::McpError(data) => ConnectionError::Remote {
            code: data.code.0,
            message: data.message.to_string(),
        },
        other => ConnectionError::Transport(other.to_string()),
    }
}

#[async_trait]
impl McpConnection for RmcpConnection {
    async fn list_tools(&self) -> Result<Vec<Tool>, ConnectionError> {
        const METHOD: &str = "tools/list";
        self.require(CapabilityKind::Tool, METHOD)?;
        self.client
            .list_all_tools()
            .await
            .map_err(|e| map_service_error(METHOD, e))
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ConnectionError> {
        const METHOD: &str = "resources/list";
        self.require(CapabilityKind::Resource, METHOD)?;
        self.client
            .list_all_resources()
            .await
            .map_err(|e| map_service_error(METHOD, e))
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>, ConnectionError> {
        const METHOD: &str = "prompts/list";
        self.require(CapabilityKind::Prompt, METHOD)?;
        self.client
            .list_all_prompts()
            .await
            .map_err(|e| map_service_error(METHOD, e))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ConnectionError> {
        self.client
            .call_tool(call_tool_params(name, arguments))
            .await
            .map_err(|e| map_service_error("tools/call", e))
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ConnectionError> {
        const METHOD: &str = "resources/read";
        self.require(CapabilityKind::Resource, METHOD)?;
        self.client
            .read_resource(ReadResourceRequestParams {
                meta: None,
                uri: uri.to_string(),
            })
            .await
            .map_err(|e| map_service_error(METHOD, e))
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<GetPromptResult, ConnectionError> {
        const METHOD: &str = "prompts/get";
        self.require(CapabilityKind::Prompt, METHOD)?;
        self.client
            .get_prompt(GetPromptRequestParams {
                meta: None,
                name: name.to_string(),
                arguments,
            })
            .await
            .map_err(|e| map_service_error(METHOD, e))
    }
}

/// Arguments are always sent, even when empty.
fn call_tool_params(name: &str, arguments: JsonObject) -> CallToolRequestParams {
    CallToolRequestParams {
        meta: None,
        name: name.to_string().into(),
        arguments: Some(arguments),
        task: None,
    }
}

/// Connect every configured server in order and register the ones that come
/// up. A server that fails is logged and left out. Returns the number of
/// connected servers.
pub async fn connect_all(configs: &[McpServiceConfig], registry: &ServerRegistry) -> usize {
    let mut connected = 0;
    for cfg in configs {
        match RmcpConnection::connect(cfg).await {
            Ok(connection) => match registry.register(cfg.name().clone(), Arc::new(connection)).await {
                Ok(()) => connected += 1,
                Err(e) => warn!("{}", e),
            },
            Err(e) => warn!(server = %cfg.name(), "Failed to connect: {:#}", e),
        }
    }
    connected
}
