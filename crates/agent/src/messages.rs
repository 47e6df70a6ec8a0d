//! Application-level messages that live in an agent context alongside the
//! canonical ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use switchyard_core::message::{AgentMessage, CustomMessage, Message};

/// Record of a shell command the user ran outside the model's tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BashExecutionMessage {
    pub command: String,
    pub output: String,

    /// `None` when the process ended without a code (killed, cancelled)
    #[serde(default)]
    pub exit_code: Option<i32>,

    #[serde(default)]
    pub cancelled: bool,

    /// Output was cut to fit; `full_output_path` points at the complete log
    #[serde(default)]
    pub truncated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_output_path: Option<String>,

    /// Kept in the transcript but never shown to the model
    #[serde(default)]
    pub exclude_from_context: bool,

    pub timestamp: DateTime<Utc>,
}

impl BashExecutionMessage {
    pub fn new(command: impl Into<String>, output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
            exit_code,
            cancelled: false,
            truncated: false,
            full_output_path: None,
            exclude_from_context: false,
            timestamp: Utc::now(),
        }
    }

    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    pub fn truncated(mut self, full_output_path: Option<String>) -> Self {
        self.truncated = true;
        self.full_output_path = full_output_path;
        self
    }

    pub fn excluded_from_context(mut self) -> Self {
        self.exclude_from_context = true;
        self
    }

    /// Text presented to the model.
    pub fn to_text(&self) -> String {
        let mut text = format!("Ran `{}`\n", self.command);
        if self.output.is_empty() {
            text.push_str("(no output)");
        } else {
            text.push_str(&format!("```\n{}\n```", self.output));
        }

        match (self.exit_code, self.cancelled) {
            (_, true) => text.push_str("\n\n(command cancelled)"),
            (Some(0), false) => {}
            (Some(code), false) => text.push_str(&format!("\n\nCommand exited with code {code}")),
            (None, false) => text.push_str("\n\nCommand ended without an exit code"),
        }

        if self.truncated {
            match &self.full_output_path {
                Some(path) => text.push_str(&format!("\n\n[Output truncated. Full output: {path}]")),
                None => text.push_str("\n\n[Output truncated]"),
            }
        }
        text
    }
}

impl CustomMessage for BashExecutionMessage {
    fn kind(&self) -> &str {
        "bashExecution"
    }

    fn to_llm(&self) -> Option<Message> {
        if self.exclude_from_context {
            return None;
        }
        Some(Message::user(self.to_text()))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl From<BashExecutionMessage> for AgentMessage {
    fn from(msg: BashExecutionMessage) -> Self {
        AgentMessage::Custom(Arc::new(msg))
    }
}
