//! Concurrent capability aggregation across all registered servers.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{ambiguous_names, CapabilityDescriptor, CapabilityKind, Catalog};
use crate::error::ConnectionError;
use crate::mcp::McpConnection;
use crate::registry::ServerRegistry;
use crate::types::ServerName;

/// Merges the listings of every registered server into one catalog.
///
/// Nothing is cached: each call re-queries the servers, since a server may
/// gain or lose capabilities between turns.
#[derive(Clone)]
pub struct CapabilityAggregator {
    registry: Arc<ServerRegistry>,
}

impl CapabilityAggregator {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self { registry }
    }

    /// Query every server for `kind` in parallel.
    ///
    /// A failing server is skipped with a warning and a server that does not
    /// implement the listing contributes nothing; neither affects the others.
    /// Output is grouped by server in registration order.
    pub async fn collect(&self, kind: CapabilityKind) -> Vec<CapabilityDescriptor> {
        let servers = self.registry.snapshot().await;
        let mut tasks = JoinSet::new();

        for (position, server) in servers.into_iter().enumerate() {
            tasks.spawn(async move {
                let listed = list_kind(server.connection.as_ref(), &server.name, kind).await;
                (position, server.name, listed)
            });
        }

        let mut per_server: Vec<(usize, Vec<CapabilityDescriptor>)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, _, Ok(descriptors))) => per_server.push((position, descriptors)),
                Ok((_, name, Err(e))) if e.is_method_not_supported() => {
                    debug!(server = %name, %kind, "Server does not support listing");
                }
                Ok((_, name, Err(e))) => {
                    warn!(server = %name, %kind, "Failed to list capabilities: {}", e);
                }
                Err(e) => warn!(%kind, "Capability listing task failed: {}", e),
            }
        }

        per_server.sort_by_key(|(position, _)| *position);
        let descriptors: Vec<CapabilityDescriptor> = per_server
            .into_iter()
            .flat_map(|(_, descriptors)| descriptors)
            .collect();

        for (name, owners) in ambiguous_names(&descriptors) {
            let owners: Vec<&str> = owners.iter().map(|s| s.as_str()).collect();
            warn!(
                %kind,
                name = %name,
                owners = %owners.join(", "),
                "Ambiguous capability name; bare references resolve to {}",
                owners[0]
            );
        }

        descriptors
    }

    /// Collect tools, resources and prompts at once.
    pub async fn catalog(&self) -> Catalog {
        let (tools, resources, prompts) = tokio::join!(
            self.collect(CapabilityKind::Tool),
            self.collect(CapabilityKind::Resource),
            self.collect(CapabilityKind::Prompt),
        );
        Catalog {
            tools,
            resources,
            prompts,
        }
    }
}

async fn list_kind(
    connection: &dyn McpConnection,
    server: &ServerName,
    kind: CapabilityKind,
) -> Result<Vec<CapabilityDescriptor>, ConnectionError> {
    let descriptors = match kind {
        CapabilityKind::Tool => connection
            .list_tools()
            .await?
            .into_iter()
            .map(|t| CapabilityDescriptor::from_tool(server.clone(), t))
            .collect(),
        CapabilityKind::Resource => connection
            .list_resources()
            .await?
            .into_iter()
            .map(|r| CapabilityDescriptor::from_resource(server.clone(), r))
            .collect(),
        CapabilityKind::Prompt => connection
            .list_prompts()
            .await?
            .into_iter()
            .map(|p| CapabilityDescriptor::from_prompt(server.clone(), p))
            .collect(),
    };
    Ok(descriptors)
}
