//! NewType wrappers for the identifiers that flow between the registry,
//! the aggregator and the router.
//!
//! Keeping server names and qualified capability names apart prevents
//! passing a bare tool name where a routable identifier is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Server name as chosen by configuration (the key under `mcp`).
    ///
    /// This is never negotiated with the server itself; two processes that
    /// report the same `serverInfo.name` still get distinct registry keys.
    ServerName
);

newtype_string!(
    /// Globally unique capability identifier: `server.tool`, `server.prompt`
    /// or `server:uri`.
    QualifiedName
);

newtype_string!(
    /// Language model identifier, e.g. `llama3.2:latest`.
    ModelName
);
