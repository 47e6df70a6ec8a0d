//! Provider-facing request and stream types.
//!
//! A vendor adapter receives a [`Context`] and options, and answers with an
//! [`AssistantMessageEventStream`]: a `start` event, a series of incremental
//! deltas, and a terminal `done` or `error`. Every non-terminal event carries
//! a full snapshot of the in-progress assistant message.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::message::{AssistantMessage, Message, StopReason, ToolCall};
use crate::stream::EventStream;

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Everything a single model call needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// Options understood by every adapter.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub headers: HashMap<String, String>,
    pub session_id: Option<String>,
    /// Cancels the in-flight request; adapters end the stream with `aborted`
    pub cancel: CancellationToken,
    /// Vendor-specific options, interpreted by the adapter that receives them
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Requested reasoning effort for the simplified entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl ThinkingLevel {
    /// Token budget used by APIs that take an explicit thinking budget.
    pub fn budget_tokens(self) -> u32 {
        match self {
            Self::Minimal => 1024,
            Self::Low => 2048,
            Self::Medium => 8192,
            Self::High => 16384,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Options for the simplified entry point: common options plus a reasoning level.
#[derive(Debug, Clone, Default)]
pub struct SimpleStreamOptions {
    pub base: StreamOptions,
    pub reasoning: Option<ThinkingLevel>,
}

/// Incremental events produced while an assistant message streams in.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantMessageEvent {
    Start {
        partial: AssistantMessage,
    },
    TextStart {
        content_index: usize,
        partial: AssistantMessage,
    },
    TextDelta {
        content_index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    TextEnd {
        content_index: usize,
        content: String,
        partial: AssistantMessage,
    },
    ThinkingStart {
        content_index: usize,
        partial: AssistantMessage,
    },
    ThinkingDelta {
        content_index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    ThinkingEnd {
        content_index: usize,
        content: String,
        partial: AssistantMessage,
    },
    #[serde(rename = "toolcall_start")]
    ToolCallStart {
        content_index: usize,
        partial: AssistantMessage,
    },
    #[serde(rename = "toolcall_delta")]
    ToolCallDelta {
        content_index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    #[serde(rename = "toolcall_end")]
    ToolCallEnd {
        content_index: usize,
        tool_call: ToolCall,
        partial: AssistantMessage,
    },
    Done {
        reason: StopReason,
        message: AssistantMessage,
    },
    Error {
        reason: StopReason,
        error: AssistantMessage,
    },
}

impl AssistantMessageEvent {
    /// The in-progress snapshot carried by non-terminal events.
    pub fn partial(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Start { partial }
            | Self::TextStart { partial, .. }
            | Self::TextDelta { partial, .. }
            | Self::TextEnd { partial, .. }
            | Self::ThinkingStart { partial, .. }
            | Self::ThinkingDelta { partial, .. }
            | Self::ThinkingEnd { partial, .. }
            | Self::ToolCallStart { partial, .. }
            | Self::ToolCallDelta { partial, .. }
            | Self::ToolCallEnd { partial, .. } => Some(partial),
            Self::Done { .. } | Self::Error { .. } => None,
        }
    }

    /// The authoritative final message carried by terminal events.
    pub fn final_message(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Done { message, .. } => Some(message),
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// The stream every adapter returns; its result is the final assistant message.
pub type AssistantMessageEventStream = EventStream<AssistantMessageEvent, AssistantMessage>;

/// Create an empty adapter stream that completes on `done` / `error`.
pub fn assistant_message_stream() -> AssistantMessageEventStream {
    EventStream::new(AssistantMessageEvent::is_terminal, |event| match event {
        AssistantMessageEvent::Done { message, .. } => message.clone(),
        AssistantMessageEvent::Error { error, .. } => error.clone(),
        other => unreachable!("non-terminal event resolved the stream: {other:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Api;
    use futures::StreamExt;

    fn partial() -> AssistantMessage {
        AssistantMessage::empty(Api::OpenAiCompletions, "openai", "gpt-4o")
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "shell".into(),
            description: "Execute a shell command".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The command to run" }
                },
                "required": ["command"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("shell"));
        assert!(json.contains("command"));
    }

    #[test]
    fn event_type_tags() {
        let event = AssistantMessageEvent::ToolCallStart {
            content_index: 0,
            partial: partial(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "toolcall_start");

        let event = AssistantMessageEvent::TextDelta {
            content_index: 0,
            delta: "hi".into(),
            partial: partial(),
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "text_delta");
    }

    #[test]
    fn thinking_budgets_increase() {
        assert!(ThinkingLevel::Minimal.budget_tokens() < ThinkingLevel::Low.budget_tokens());
        assert!(ThinkingLevel::Medium.budget_tokens() < ThinkingLevel::High.budget_tokens());
    }

    #[tokio::test]
    async fn assistant_stream_resolves_with_done_message() {
        let stream = assistant_message_stream();
        stream.push(AssistantMessageEvent::Start { partial: partial() });
        let mut done = partial();
        done.content.push(crate::message::ContentBlock::text("final"));
        stream.push(AssistantMessageEvent::Done {
            reason: StopReason::Stop,
            message: done.clone(),
        });

        let events: Vec<_> = stream.clone().collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(stream.result().await, Some(done));
    }

    #[tokio::test]
    async fn assistant_stream_resolves_with_error_message() {
        let stream = assistant_message_stream();
        let mut failed = partial();
        failed.stop_reason = StopReason::Error;
        failed.error_message = Some("boom".into());
        stream.push(AssistantMessageEvent::Error {
            reason: StopReason::Error,
            error: failed.clone(),
        });
        assert_eq!(stream.result().await, Some(failed));
    }
}
