//! Error types for the aggregation and routing layer.
//!
//! Only connection establishment is fatal at startup; every error here is
//! otherwise surfaced to the conversation as a rejected or failed action.

use std::fmt;

use crate::capabilities::CapabilityKind;
use crate::types::{QualifiedName, ServerName};

/// JSON-RPC code servers return for a method they do not implement.
pub const METHOD_NOT_FOUND_ERROR_CODE: i32 = -32601;

/// Errors raised by the server registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A connection with this name is already registered.
    DuplicateServer(ServerName),
    /// No connection is registered under this name.
    NotFound(ServerName),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateServer(name) => write!(f, "Server already registered: {}", name),
            Self::NotFound(name) => write!(f, "Server not found: {}", name),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors raised by a single server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The server does not implement this method (or did not advertise the
    /// capability). Aggregation treats this as "zero capabilities".
    MethodNotSupported(String),
    /// The server answered with a JSON-RPC error.
    Remote { code: i32, message: String },
    /// The transport failed or the session is gone.
    Transport(String),
    /// The server answered with a payload we could not decode.
    InvalidResponse(String),
}

impl ConnectionError {
    /// Whether this error only signals an unimplemented method.
    pub fn is_method_not_supported(&self) -> bool {
        matches!(self, Self::MethodNotSupported(_))
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MethodNotSupported(method) => write!(f, "Method not supported: {}", method),
            Self::Remote { code, message } => write!(f, "Remote error {}: {}", code, message),
            Self::Transport(msg) => write!(f, "Transport error: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for ConnectionError {}

/// Errors raised while resolving or forwarding a routed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// No connected server exposes this identifier.
    CapabilityNotFound {
        kind: CapabilityKind,
        identifier: String,
        known: Vec<QualifiedName>,
    },
    /// The identifier resolved to a server that is no longer registered.
    Routing { server: ServerName, identifier: String },
    /// The owning connection failed the call. The source is passed through
    /// untouched.
    Remote {
        server: ServerName,
        source: ConnectionError,
    },
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapabilityNotFound {
                kind,
                identifier,
                known,
            } => {
                write!(f, "{} {} not found on any server", kind.label(), identifier)?;
                if known.is_empty() {
                    write!(f, " (no {} available)", kind.plural())
                } else {
                    let known: Vec<&str> = known.iter().map(|q| q.as_str()).collect();
                    write!(f, ". Available: {}", known.join(", "))
                }
            }
            Self::Routing { server, identifier } => {
                write!(f, "Server {} not found while routing {}", server, identifier)
            }
            Self::Remote { server, source } => write!(f, "{} failed: {}", server, source),
        }
    }
}

impl std::error::Error for RouterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// The model's structured-decision response could not be turned into a
/// decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionParseError {
    /// The response was empty or whitespace.
    Empty,
    /// The extracted text was not valid JSON for a decision.
    InvalidJson(String),
}

impl fmt::Display for DecisionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Model returned an empty decision"),
            Self::InvalidJson(msg) => write!(f, "Decision is not valid JSON: {}", msg),
        }
    }
}

impl std::error::Error for DecisionParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_not_found_lists_known_names() {
        let err = RouterError::CapabilityNotFound {
            kind: CapabilityKind::Tool,
            identifier: "create_item".to_string(),
            known: vec![
                QualifiedName::new("notes.get_note"),
                QualifiedName::new("calendar.list_events"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Tool create_item not found on any server. Available: notes.get_note, calendar.list_events"
        );
    }

    #[test]
    fn test_capability_not_found_with_empty_catalog() {
        let err = RouterError::CapabilityNotFound {
            kind: CapabilityKind::Prompt,
            identifier: "summarize".to_string(),
            known: Vec::new(),
        };
        assert_eq!(
            err.to_string(),
            "Prompt summarize not found on any server (no prompts available)"
        );
    }

    #[test]
    fn test_remote_error_exposes_source() {
        use std::error::Error;

        let err = RouterError::Remote {
            server: ServerName::new("notes"),
            source: ConnectionError::Transport("pipe closed".to_string()),
        };
        assert_eq!(err.to_string(), "notes failed: Transport error: pipe closed");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_method_not_supported_is_distinguishable() {
        assert!(ConnectionError::MethodNotSupported("resources/list".into()).is_method_not_supported());
        assert!(!ConnectionError::Transport("gone".into()).is_method_not_supported());
    }
}
