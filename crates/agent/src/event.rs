//! Agent-level lifecycle events.
//!
//! `AgentEvent` is what a loop invocation publishes on its
//! [`AgentEventStream`]. Assistant messages stream through
//! `message_start` / `message_update` / `message_end`; every other message
//! gets a back-to-back `message_start` / `message_end` pair.
//!
//! Per invocation the sequence is:
//! - `agent_start`        once, first
//! - `turn_start`         before each model call
//! - `message_*`          prompts, injected messages, assistant and tool results
//! - `tool_execution_*`   around each tool call
//! - `turn_end`           after the assistant message and its tool results
//! - `agent_end`          once, last; carries every message the run produced

use serde::Serialize;
use switchyard_core::message::{AgentMessage, ToolResultMessage};
use switchyard_core::provider::AssistantMessageEvent;
use switchyard_core::stream::EventStream;
use switchyard_core::tool::ToolOutput;

/// Events emitted by the agent loop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentStart,

    /// The run is over; `messages` is everything appended during it.
    AgentEnd { messages: Vec<AgentMessage> },

    TurnStart,

    TurnEnd {
        message: AgentMessage,
        tool_results: Vec<ToolResultMessage>,
    },

    MessageStart { message: AgentMessage },

    /// A streaming assistant message changed. Carries the raw adapter event
    /// and the current snapshot.
    MessageUpdate {
        message: AgentMessage,
        assistant_message_event: AssistantMessageEvent,
    },

    MessageEnd { message: AgentMessage },

    ToolExecutionStart {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },

    ToolExecutionUpdate {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
        partial_result: ToolOutput,
    },

    ToolExecutionEnd {
        tool_call_id: String,
        tool_name: String,
        result: ToolOutput,
        is_error: bool,
    },
}

impl AgentEvent {
    /// Wire name of this event, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentStart => "agent_start",
            Self::AgentEnd { .. } => "agent_end",
            Self::TurnStart => "turn_start",
            Self::TurnEnd { .. } => "turn_end",
            Self::MessageStart { .. } => "message_start",
            Self::MessageUpdate { .. } => "message_update",
            Self::MessageEnd { .. } => "message_end",
            Self::ToolExecutionStart { .. } => "tool_execution_start",
            Self::ToolExecutionUpdate { .. } => "tool_execution_update",
            Self::ToolExecutionEnd { .. } => "tool_execution_end",
        }
    }
}

/// Channel of one loop invocation; resolves to the produced messages.
pub type AgentEventStream = EventStream<AgentEvent, Vec<AgentMessage>>;

/// Create an empty channel that completes on `agent_end`.
pub fn agent_event_stream() -> AgentEventStream {
    EventStream::new(
        |event| matches!(event, AgentEvent::AgentEnd { .. }),
        |event| match event {
            AgentEvent::AgentEnd { messages } => messages.clone(),
            _ => Vec::new(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn event_serialization_agent_start() {
        let json = serde_json::to_string(&AgentEvent::AgentStart).unwrap();
        assert_eq!(json, r#"{"type":"agent_start"}"#);
    }

    #[test]
    fn event_serialization_tool_execution_end() {
        let event = AgentEvent::ToolExecutionEnd {
            tool_call_id: "call_1".into(),
            tool_name: "read".into(),
            result: ToolOutput::error("boom"),
            is_error: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_execution_end");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["is_error"], true);
        assert_eq!(json["result"]["content"][0]["text"], "boom");
    }

    #[test]
    fn event_serialization_message_start_uses_role() {
        let event = AgentEvent::MessageStart {
            message: AgentMessage::user("hi"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_start");
        assert_eq!(json["message"]["role"], "user");
    }

    #[test]
    fn event_type_matches_serialized_tag() {
        let events = vec![
            AgentEvent::AgentStart,
            AgentEvent::TurnStart,
            AgentEvent::MessageEnd {
                message: AgentMessage::user("x"),
            },
            AgentEvent::ToolExecutionStart {
                tool_call_id: "c".into(),
                tool_name: "t".into(),
                args: serde_json::json!({}),
            },
            AgentEvent::AgentEnd { messages: vec![] },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[tokio::test]
    async fn stream_resolves_on_agent_end() {
        let stream = agent_event_stream();
        stream.push(AgentEvent::AgentStart);
        stream.push(AgentEvent::AgentEnd {
            messages: vec![AgentMessage::user("done")],
        });
        // Ignored after completion.
        stream.push(AgentEvent::TurnStart);

        let events: Vec<_> = stream.clone().collect().await;
        assert_eq!(events.len(), 2);
        let result = stream.result().await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].role(), "user");
    }
}
