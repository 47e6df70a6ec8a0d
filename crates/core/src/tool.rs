//! Tool trait: the uniform execute contract the agent loop invokes.
//!
//! The kernel does not interpret what a tool does. It looks the tool up by
//! name, validates the model's arguments against the tool's schema, calls
//! [`Tool::execute`] and turns the outcome into a tool-result message.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::message::{ContentBlock, ToolCall};
use crate::provider::ToolDefinition;
use crate::schema::validate_arguments;

/// What a tool hands back, either as a partial update or as its final result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolOutput {
    /// Content shown to the model
    pub content: Vec<ContentBlock>,

    /// Structured data for the surrounding application; never sent to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Whether this output describes a failure
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            details: None,
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Receives partial results while a tool runs.
pub type ToolUpdateCallback = Arc<dyn Fn(ToolOutput) + Send + Sync>;

/// The core Tool trait.
///
/// Tools are registered in a [`ToolRegistry`] and made available to the
/// agent loop. Execution is cooperative: long-running tools should watch
/// `cancel` and return [`ToolError::Aborted`] when it fires.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read", "bash").
    fn name(&self) -> &str;

    /// Human-readable label for display. Defaults to the name.
    fn label(&self) -> &str {
        self.name()
    }

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already validated arguments.
    async fn execute(
        &self,
        call_id: &str,
        arguments: serde_json::Value,
        cancel: CancellationToken,
        on_update: Option<ToolUpdateCallback>,
    ) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Validate a call's arguments against the tool's schema, returning the
/// coerced arguments.
pub fn validate_tool_call(tool: &dyn Tool, call: &ToolCall) -> std::result::Result<serde_json::Value, ToolError> {
    validate_arguments(&tool.parameters_schema(), &call.arguments).map_err(|reason| {
        ToolError::InvalidArguments {
            tool_name: call.name.clone(),
            reason,
        }
    })
}

/// An ordered set of available tools.
///
/// Definitions are reported in registration order so the tool list sent to
/// the model is stable across turns.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}
