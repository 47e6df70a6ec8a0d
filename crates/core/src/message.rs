//! Message domain types.
//!
//! These are the canonical value objects that flow through the entire kernel:
//! the agent loop appends them to a context, adapters encode them into vendor
//! payloads, and the normalizer rewrites them for replay against another model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::model::Api;

/// A single content block inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    /// Visible text
    Text { text: String },

    /// Model reasoning ("thinking")
    Thinking {
        thinking: String,
        /// Replay signature; only meaningful to the model that produced it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking_signature: Option<String>,
        /// Opaque encrypted reasoning; `thinking_signature` holds the payload
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        redacted: bool,
    },

    /// Base64-encoded image
    Image { data: String, mime_type: String },

    /// A tool invocation requested by the assistant
    ToolCall(ToolCall),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
            thinking_signature: None,
            redacted: false,
        }
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            Self::ToolCall(call) => Some(call),
            _ => None,
        }
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Vendor-scoped call id
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,

    /// Vendor-private continuation token; never forwarded across models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            thought_signature: None,
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    #[default]
    Stop,
    Length,
    ToolUse,
    Error,
    Aborted,
}

impl StopReason {
    /// Error and aborted turns are incomplete and must not be replayed.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Aborted)
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u32,
    pub output: u32,
    #[serde(default)]
    pub cache_read: u32,
    #[serde(default)]
    pub cache_write: u32,
    pub total_tokens: u32,
}

/// A message authored by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: Vec<ContentBlock>,
    pub timestamp: DateTime<Utc>,
}

/// A message produced by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,

    /// Wire protocol that produced this message
    pub api: Api,

    /// Provider that produced this message
    pub provider: String,

    /// Model id that produced this message
    pub model: String,

    #[serde(default)]
    pub usage: Usage,

    pub stop_reason: StopReason,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl AssistantMessage {
    /// An empty message attributed to the given backend.
    pub fn empty(api: Api, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: Vec::new(),
            api,
            provider: provider.into(),
            model: model.into(),
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    /// All tool-call blocks, in the order the model requested them.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content.iter().filter_map(ContentBlock::as_tool_call).collect()
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// The result of one tool call, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

impl ToolResultMessage {
    /// An error result carrying a single text block.
    pub fn error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: vec![ContentBlock::text(text)],
            details: None,
            is_error: true,
            timestamp: Utc::now(),
        }
    }
}

/// A canonical conversation message, as understood by every model API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    ToolResult(ToolResultMessage),
}

impl Message {
    /// Create a new user message with a single text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User(UserMessage {
            content: vec![ContentBlock::text(text)],
            timestamp: Utc::now(),
        })
    }

    /// Create a user message from arbitrary blocks.
    pub fn user_blocks(content: Vec<ContentBlock>) -> Self {
        Self::User(UserMessage {
            content,
            timestamp: Utc::now(),
        })
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::ToolResult(_) => "toolResult",
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResultMessage> {
        match self {
            Self::ToolResult(msg) => Some(msg),
            _ => None,
        }
    }
}

impl From<AssistantMessage> for Message {
    fn from(msg: AssistantMessage) -> Self {
        Self::Assistant(msg)
    }
}

impl From<ToolResultMessage> for Message {
    fn from(msg: ToolResultMessage) -> Self {
        Self::ToolResult(msg)
    }
}

impl From<UserMessage> for Message {
    fn from(msg: UserMessage) -> Self {
        Self::User(msg)
    }
}

/// A message type owned by a surrounding layer (e.g. a command-execution
/// record) that can travel through the agent context.
///
/// Implementations decide how, if at all, they are presented to a model.
pub trait CustomMessage: fmt::Debug + Send + Sync {
    /// Stable discriminator, e.g. `"bashExecution"`.
    fn kind(&self) -> &str;

    /// Reduce to a canonical message, or `None` to keep it out of model context.
    fn to_llm(&self) -> Option<Message>;

    /// JSON payload used when the message is serialized in events.
    fn to_json(&self) -> serde_json::Value;
}

/// Anything that can live in an agent context.
#[derive(Debug, Clone)]
pub enum AgentMessage {
    Message(Message),
    Custom(Arc<dyn CustomMessage>),
}

impl AgentMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::Message(Message::user(text))
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(msg) => Some(msg),
            Self::Custom(_) => None,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        self.as_message().and_then(Message::as_assistant)
    }

    /// Role string; custom messages report their kind.
    pub fn role(&self) -> &str {
        match self {
            Self::Message(msg) => msg.role(),
            Self::Custom(custom) => custom.kind(),
        }
    }

    /// Reduce to the canonical form sent to a model.
    pub fn to_llm(&self) -> Option<Message> {
        match self {
            Self::Message(msg) => Some(msg.clone()),
            Self::Custom(custom) => custom.to_llm(),
        }
    }
}

impl From<Message> for AgentMessage {
    fn from(msg: Message) -> Self {
        Self::Message(msg)
    }
}

impl From<AssistantMessage> for AgentMessage {
    fn from(msg: AssistantMessage) -> Self {
        Self::Message(Message::Assistant(msg))
    }
}

impl From<ToolResultMessage> for AgentMessage {
    fn from(msg: ToolResultMessage) -> Self {
        Self::Message(Message::ToolResult(msg))
    }
}

impl Serialize for AgentMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Message(msg) => msg.serialize(serializer),
            Self::Custom(custom) => serde_json::json!({
                "role": custom.kind(),
                "data": custom.to_json(),
            })
            .serialize(serializer),
        }
    }
}

/// Default reduction of an agent context to canonical messages.
///
/// Canonical messages pass through; custom messages are reduced and dropped
/// when they reduce to nothing.
pub fn convert_to_llm(messages: &[AgentMessage]) -> Vec<Message> {
    messages.iter().filter_map(AgentMessage::to_llm).collect()
}
