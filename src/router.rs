//! Resolves capability identifiers to their owning server and forwards calls.
//!
//! Tools, resources and prompts share one resolution routine. An identifier
//! is routed explicitly when it starts with a registered server name and the
//! separator (longest name first), otherwise it is looked up as a bare name in
//! a fresh listing and the first-registered owner wins. Nothing is retried and
//! results pass through untouched.

use std::sync::Arc;

use rmcp::model::{CallToolResult, GetPromptResult, JsonObject, ReadResourceResult};
use tracing::{debug, info};

use crate::capabilities::{qualify, split_registered, CapabilityAggregator, CapabilityKind};
use crate::error::RouterError;
use crate::mcp::McpConnection;
use crate::registry::ServerRegistry;
use crate::types::ServerName;

/// Where an identifier resolved to.
pub struct Route {
    pub server: ServerName,
    pub local_name: String,
    pub connection: Arc<dyn McpConnection>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("server", &self.server)
            .field("local_name", &self.local_name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct CallRouter {
    registry: Arc<ServerRegistry>,
    aggregator: CapabilityAggregator,
}

impl CallRouter {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        let aggregator = CapabilityAggregator::new(registry.clone());
        Self {
            registry,
            aggregator,
        }
    }

    pub fn aggregator(&self) -> &CapabilityAggregator {
        &self.aggregator
    }

    /// Resolve `identifier` of the given kind to one owning connection.
    pub async fn resolve(
        &self,
        kind: CapabilityKind,
        identifier: &str,
    ) -> Result<Route, RouterError> {
        let servers = self.registry.list().await;
        if let Some((server, local_name)) = split_registered(kind, identifier, &servers) {
            debug!(%kind, %server, local_name, "Explicit route");
            return self
                .route(server.clone(), local_name.to_string(), identifier)
                .await;
        }

        let descriptors = self.aggregator.collect(kind).await;
        match descriptors.iter().find(|d| d.local_name == identifier) {
            Some(found) => {
                debug!(%kind, server = %found.server, identifier, "Bare name resolved");
                self.route(found.server.clone(), found.local_name.clone(), identifier)
                    .await
            }
            None => Err(RouterError::CapabilityNotFound {
                kind,
                identifier: identifier.to_string(),
                known: descriptors.into_iter().map(|d| d.qualified_name).collect(),
            }),
        }
    }

    async fn route(
        &self,
        server: ServerName,
        local_name: String,
        identifier: &str,
    ) -> Result<Route, RouterError> {
        let connection = self
            .registry
            .get(server.as_str())
            .await
            .map_err(|_| RouterError::Routing {
                server: server.clone(),
                identifier: identifier.to_string(),
            })?;
        Ok(Route {
            server,
            local_name,
            connection,
        })
    }

    /// Call a tool by bare or qualified name.
    pub async fn invoke(
        &self,
        identifier: &str,
        arguments: JsonObject,
    ) -> Result<CallToolResult, RouterError> {
        let route = self.resolve(CapabilityKind::Tool, identifier).await?;
        Self::call(route, arguments).await
    }

    /// Call `tool` on a known server, skipping name resolution.
    pub async fn invoke_on(
        &self,
        server: &ServerName,
        tool: &str,
        arguments: JsonObject,
    ) -> Result<CallToolResult, RouterError> {
        let identifier = qualify(CapabilityKind::Tool, server, tool);
        let route = self
            .route(server.clone(), tool.to_string(), identifier.as_str())
            .await?;
        Self::call(route, arguments).await
    }

    async fn call(route: Route, arguments: JsonObject) -> Result<CallToolResult, RouterError> {
        info!(server = %route.server, tool = %route.local_name, "Calling tool");
        route
            .connection
            .call_tool(&route.local_name, arguments)
            .await
            .map_err(|source| RouterError::Remote {
                server: route.server.clone(),
                source,
            })
    }

    /// Read a resource by bare URI or `server:uri`.
    pub async fn read_resource(&self, identifier: &str) -> Result<ReadResourceResult, RouterError> {
        let route = self.resolve(CapabilityKind::Resource, identifier).await?;
        info!(server = %route.server, uri = %route.local_name, "Reading resource");
        route
            .connection
            .read_resource(&route.local_name)
            .await
            .map_err(|source| RouterError::Remote {
                server: route.server.clone(),
                source,
            })
    }

    /// Fetch a prompt by bare or qualified name.
    pub async fn get_prompt(
        &self,
        identifier: &str,
        arguments: Option<JsonObject>,
    ) -> Result<GetPromptResult, RouterError> {
        let route = self.resolve(CapabilityKind::Prompt, identifier).await?;
        info!(server = %route.server, prompt = %route.local_name, "Getting prompt");
        route
            .connection
            .get_prompt(&route.local_name, arguments)
            .await
            .map_err(|source| RouterError::Remote {
                server: route.server.clone(),
                source,
            })
    }
}
