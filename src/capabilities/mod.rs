//! Capability descriptors and the aggregated catalog.
//!
//! Every tool, resource and prompt a server reports becomes a
//! [`CapabilityDescriptor`] tagged with its owning server and a qualified
//! name that is unique across the whole catalog:
//!
//! - tools and prompts: `<server>.<name>`
//! - resources: `<server>:<uri>`
//!
//! Construction and parsing of that grammar happens only in [`qualify`] and
//! [`split_registered`].

mod aggregator;

pub use aggregator::CapabilityAggregator;

use std::collections::BTreeMap;
use std::fmt;

use rmcp::model::{Prompt, Resource, Tool};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mcp::parser::McpParser;
use crate::types::{QualifiedName, ServerName};

/// The three capability kinds a server can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl CapabilityKind {
    /// Separator between server name and local name in a qualified name.
    pub fn separator(self) -> char {
        match self {
            Self::Tool | Self::Prompt => '.',
            Self::Resource => ':',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Tool => "Tool",
            Self::Resource => "Resource",
            Self::Prompt => "Prompt",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Self::Tool => "tools",
            Self::Resource => "resources",
            Self::Prompt => "prompts",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

/// Build the qualified name of a capability.
pub fn qualify(kind: CapabilityKind, server: &ServerName, local_name: &str) -> QualifiedName {
    QualifiedName::new(format!("{}{}{}", server, kind.separator(), local_name))
}

/// Split off the longest registered server name that prefixes `identifier`
/// followed by the separator of `kind`.
///
/// Returns `None` when no server matches or nothing follows the separator.
/// Matching against known names rather than the first separator keeps
/// identifiers like `notes.v2.create_item` and `notes:file:///a.md` routable.
pub fn split_registered<'s, 'i>(
    kind: CapabilityKind,
    identifier: &'i str,
    servers: &'s [ServerName],
) -> Option<(&'s ServerName, &'i str)> {
    servers
        .iter()
        .filter_map(|server| {
            let local = identifier
                .strip_prefix(server.as_str())?
                .strip_prefix(kind.separator())?;
            (!local.is_empty()).then_some((server, local))
        })
        .max_by_key(|(server, _)| server.as_str().len())
}

/// A single named parameter of a tool or prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub required: bool,
    pub description: Option<String>,
    pub schema_type: Option<String>,
}

/// A tool, resource or prompt, normalized across servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub kind: CapabilityKind,
    /// Name as reported by the owning server (the URI for resources).
    pub local_name: String,
    pub server: ServerName,
    pub qualified_name: QualifiedName,
    pub parameters: Vec<ParameterSpec>,
    pub description: Option<String>,
    /// Server-specific fields kept verbatim (`title`, `mimeType`,
    /// `inputSchema`, resource `name`).
    pub extras: BTreeMap<String, Value>,
}

impl CapabilityDescriptor {
    pub fn from_tool(server: ServerName, tool: Tool) -> Self {
        let parameters = McpParser::parameters_from_schema(&tool.input_schema);
        let mut extras = BTreeMap::new();
        if let Some(title) = tool.title {
            extras.insert("title".to_string(), Value::String(title));
        }
        extras.insert(
            "inputSchema".to_string(),
            Value::Object(tool.input_schema.as_ref().clone()),
        );

        Self {
            kind: CapabilityKind::Tool,
            qualified_name: qualify(CapabilityKind::Tool, &server, &tool.name),
            local_name: tool.name.into_owned(),
            server,
            parameters,
            description: tool.description.map(|d| d.into_owned()),
            extras,
        }
    }

    pub fn from_resource(server: ServerName, resource: Resource) -> Self {
        let resource = resource.raw;
        let mut extras = BTreeMap::new();
        if !resource.name.is_empty() {
            extras.insert("name".to_string(), Value::String(resource.name));
        }
        if let Some(title) = resource.title {
            extras.insert("title".to_string(), Value::String(title));
        }
        if let Some(mime_type) = resource.mime_type {
            extras.insert("mimeType".to_string(), Value::String(mime_type));
        }

        Self {
            kind: CapabilityKind::Resource,
            qualified_name: qualify(CapabilityKind::Resource, &server, &resource.uri),
            local_name: resource.uri,
            server,
            parameters: Vec::new(),
            description: resource.description,
            extras,
        }
    }

    pub fn from_prompt(server: ServerName, prompt: Prompt) -> Self {
        let parameters = prompt
            .arguments
            .as_deref()
            .map(McpParser::parameters_from_prompt)
            .unwrap_or_default();
        let mut extras = BTreeMap::new();
        if let Some(title) = prompt.title {
            extras.insert("title".to_string(), Value::String(title));
        }

        Self {
            kind: CapabilityKind::Prompt,
            qualified_name: qualify(CapabilityKind::Prompt, &server, &prompt.name),
            local_name: prompt.name,
            server,
            parameters,
            description: prompt.description,
            extras,
        }
    }

    pub fn description_or_default(&self) -> &str {
        self.description.as_deref().unwrap_or("No description")
    }

    /// String-valued extra, e.g. `mimeType`.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extras.get(key).and_then(|v| v.as_str())
    }

    /// `name, [optional]` rendering of the parameters.
    pub fn parameter_list(&self) -> String {
        McpParser::render_parameter_list(&self.parameters)
    }
}

/// Everything the connected servers currently expose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub tools: Vec<CapabilityDescriptor>,
    pub resources: Vec<CapabilityDescriptor>,
    pub prompts: Vec<CapabilityDescriptor>,
}

impl Catalog {
    pub fn of(&self, kind: CapabilityKind) -> &[CapabilityDescriptor] {
        match kind {
            CapabilityKind::Tool => &self.tools,
            CapabilityKind::Resource => &self.resources,
            CapabilityKind::Prompt => &self.prompts,
        }
    }

    /// Resolve an identifier against the catalog: an exact qualified name
    /// first, then the first-registered owner of a bare local name.
    pub fn find(&self, kind: CapabilityKind, identifier: &str) -> Option<&CapabilityDescriptor> {
        let entries = self.of(kind);
        entries
            .iter()
            .find(|d| d.qualified_name.as_str() == identifier)
            .or_else(|| entries.iter().find(|d| d.local_name == identifier))
    }

    /// The entry for `local_name` owned by `server`, if that server has one.
    pub fn find_on_server(
        &self,
        kind: CapabilityKind,
        server: &str,
        local_name: &str,
    ) -> Option<&CapabilityDescriptor> {
        self.of(kind)
            .iter()
            .find(|d| d.server.as_str() == server && d.local_name == local_name)
    }

    pub fn qualified_names(&self, kind: CapabilityKind) -> Vec<QualifiedName> {
        self.of(kind)
            .iter()
            .map(|d| d.qualified_name.clone())
            .collect()
    }

    /// Bare names exposed by more than one server, with their owners in
    /// registration order.
    pub fn ambiguous_names(&self, kind: CapabilityKind) -> Vec<(String, Vec<ServerName>)> {
        ambiguous_names(self.of(kind))
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.resources.is_empty() && self.prompts.is_empty()
    }

    /// One line per tool: `- server.tool (server): description [params]`.
    pub fn render_tools(&self) -> String {
        self.tools
            .iter()
            .map(|t| {
                format!(
                    "- {} ({}): {} [{}]",
                    t.qualified_name,
                    t.server,
                    t.description_or_default(),
                    t.parameter_list()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// One line per resource: `- server:uri (server): name (mimeType)`.
    pub fn render_resources(&self) -> String {
        self.resources
            .iter()
            .map(|r| {
                format!(
                    "- {} ({}): {} ({})",
                    r.qualified_name,
                    r.server,
                    r.extra_str("name").unwrap_or("Resource"),
                    r.extra_str("mimeType").unwrap_or("unknown")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub(crate) fn ambiguous_names(entries: &[CapabilityDescriptor]) -> Vec<(String, Vec<ServerName>)> {
    let mut owners: Vec<(String, Vec<ServerName>)> = Vec::new();
    for entry in entries {
        match owners.iter_mut().find(|(name, _)| *name == entry.local_name) {
            Some((_, servers)) => servers.push(entry.server.clone()),
            None => owners.push((entry.local_name.clone(), vec![entry.server.clone()])),
        }
    }
    owners.retain(|(_, servers)| servers.len() > 1);
    owners
}
