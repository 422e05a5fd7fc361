//! Confidence and membership checks in front of the router.

use std::fmt;

use rmcp::model::{CallToolResult, JsonObject};
use tracing::{debug, info, warn};

use super::decision::IntentDecision;
use super::synthesizer::render_tool_output;
use crate::capabilities::{CapabilityDescriptor, CapabilityKind, Catalog};
use crate::mcp::{ToolResultExt, error_result};
use crate::router::CallRouter;
use crate::types::{QualifiedName, ServerName};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Why a decision did not lead to a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// The model did not ask for a tool.
    NotRequested,
    LowConfidence { confidence: f64, threshold: f64 },
    MissingToolName,
    /// No connected server exposes the named tool.
    UnknownCapability { tool_name: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequested => write!(f, "no tool requested"),
            Self::LowConfidence {
                confidence,
                threshold,
            } => write!(f, "confidence {:.2} below threshold {:.2}", confidence, threshold),
            Self::MissingToolName => write!(f, "decision names no tool"),
            Self::UnknownCapability { tool_name } => {
                write!(f, "tool {} is not exposed by any server", tool_name)
            }
        }
    }
}

/// A tool call that was made, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub tool_name: QualifiedName,
    pub server: ServerName,
    pub arguments: JsonObject,
    /// The raw result, or the routing/remote error as an error-flagged result.
    pub output: CallToolResult,
    pub rendered: String,
}

impl ExecutionResult {
    pub fn is_error(&self) -> bool {
        self.output.is_error()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Rejected(Rejection),
    Executed(ExecutionResult),
}

pub struct ExecutionGate {
    threshold: f64,
    router: CallRouter,
}

impl ExecutionGate {
    pub fn new(threshold: f64, router: CallRouter) -> Self {
        Self { threshold, router }
    }

    /// Accept or reject `decision`, and run the tool when accepted.
    pub async fn gate(&self, decision: &IntentDecision, catalog: &Catalog) -> GateVerdict {
        let descriptor = match self.check(decision, catalog) {
            Ok(descriptor) => descriptor,
            Err(rejection) => {
                match &rejection {
                    Rejection::NotRequested => debug!("Model did not request a tool"),
                    other => warn!(reasoning = %decision.reasoning, "Rejected tool decision: {}", other),
                }
                return GateVerdict::Rejected(rejection);
            }
        };

        info!(
            tool = %descriptor.qualified_name,
            confidence = decision.confidence,
            "Auto-executing tool"
        );
        let arguments = decision.arguments.clone();
        let output = match self
            .router
            .invoke_on(&descriptor.server, &descriptor.local_name, arguments.clone())
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %descriptor.qualified_name, "Tool call failed: {}", e);
                error_result(e.to_string())
            }
        };

        GateVerdict::Executed(ExecutionResult {
            rendered: render_tool_output(descriptor.qualified_name.as_str(), &output, &arguments),
            tool_name: descriptor.qualified_name.clone(),
            server: descriptor.server.clone(),
            arguments,
            output,
        })
    }

    fn check<'c>(
        &self,
        decision: &IntentDecision,
        catalog: &'c Catalog,
    ) -> Result<&'c CapabilityDescriptor, Rejection> {
        if !decision.should_execute {
            return Err(Rejection::NotRequested);
        }
        if decision.confidence < self.threshold {
            return Err(Rejection::LowConfidence {
                confidence: decision.confidence,
                threshold: self.threshold,
            });
        }
        let tool_name = decision
            .tool_name
            .as_deref()
            .ok_or(Rejection::MissingToolName)?;

        let hinted = decision
            .server_name
            .as_deref()
            .and_then(|server| catalog.find_on_server(CapabilityKind::Tool, server, tool_name));

        hinted
            .or_else(|| catalog.find(CapabilityKind::Tool, tool_name))
            .ok_or_else(|| Rejection::UnknownCapability {
                tool_name: tool_name.to_string(),
            })
    }
}
