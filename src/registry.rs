//! Named, registration-ordered collection of live server connections.
//!
//! Registration order matters: when two servers expose the same bare
//! capability name and the caller did not qualify it, the first-registered
//! server wins. The registry never reconnects on its own; a dropped server
//! has to be registered again by the caller.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::mcp::McpConnection;
use crate::types::ServerName;

/// One registry entry.
#[derive(Clone)]
pub struct RegisteredServer {
    pub name: ServerName,
    pub connection: Arc<dyn McpConnection>,
}

impl std::fmt::Debug for RegisteredServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredServer")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registry of connected MCP servers.
#[derive(Default)]
pub struct ServerRegistry {
    // A Vec keeps registration order; server counts are small enough that
    // linear lookup is not a concern.
    servers: RwLock<Vec<RegisteredServer>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under `name`.
    pub async fn register(
        &self,
        name: impl Into<ServerName>,
        connection: Arc<dyn McpConnection>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let mut servers = self.servers.write().await;

        if servers.iter().any(|s| s.name == name) {
            return Err(RegistryError::DuplicateServer(name));
        }

        info!(server = %name, position = servers.len(), "Registered MCP server");
        servers.push(RegisteredServer { name, connection });
        Ok(())
    }

    /// Look up a connection by name.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn McpConnection>, RegistryError> {
        self.servers
            .read()
            .await
            .iter()
            .find(|s| s.name.as_str() == name)
            .map(|s| s.connection.clone())
            .ok_or_else(|| RegistryError::NotFound(ServerName::new(name)))
    }

    /// All registered names, in registration order.
    pub async fn list(&self) -> Vec<ServerName> {
        self.servers
            .read()
            .await
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    /// Detach a server. Removing an unknown name is a no-op; the return value
    /// reports whether anything was removed.
    pub async fn remove(&self, name: &str) -> bool {
        let mut servers = self.servers.write().await;
        let before = servers.len();
        servers.retain(|s| s.name.as_str() != name);
        let removed = servers.len() != before;
        if removed {
            info!(server = %name, "Removed MCP server");
        } else {
            debug!(server = %name, "Remove requested for unregistered server");
        }
        removed
    }

    /// Clone out every entry, in registration order. Used by the aggregator
    /// so no lock is held while servers are being queried.
    pub async fn snapshot(&self) -> Vec<RegisteredServer> {
        self.servers.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.servers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.servers.read().await.is_empty()
    }

    /// Detach every server, closing sessions whose last handle was held here.
    pub async fn clear(&self) {
        let mut servers = self.servers.write().await;
        info!(count = servers.len(), "Disconnecting all MCP servers");
        servers.clear();
    }
}
