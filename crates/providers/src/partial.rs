//! Accumulates a streaming assistant message and publishes canonical events.
//!
//! Adapters translate vendor deltas into calls on [`PartialMessage`]; it keeps
//! the in-progress [`AssistantMessage`] and pushes an
//! [`AssistantMessageEvent`] carrying a fresh snapshot for every change.

use std::collections::HashMap;

use switchyard_core::message::{AssistantMessage, ContentBlock, StopReason, Usage};
use switchyard_core::model::Model;
use switchyard_core::provider::{AssistantMessageEvent, AssistantMessageEventStream};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolCall,
}

/// The producer side of one adapter stream.
pub struct PartialMessage {
    message: AssistantMessage,
    stream: AssistantMessageEventStream,
    /// Blocks started but not yet ended, in start order
    open: Vec<(usize, BlockKind)>,
    /// Raw JSON argument text per tool-call block
    tool_args: HashMap<usize, String>,
    started: bool,
}

impl PartialMessage {
    pub fn new(model: &Model, stream: AssistantMessageEventStream) -> Self {
        Self {
            message: AssistantMessage::empty(model.api.clone(), model.provider.clone(), model.id.clone()),
            stream,
            open: Vec::new(),
            tool_args: HashMap::new(),
            started: false,
        }
    }

    pub fn message(&self) -> &AssistantMessage {
        &self.message
    }

    fn snapshot(&self) -> AssistantMessage {
        self.message.clone()
    }

    /// Emit `start`. Idempotent.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.stream.push(AssistantMessageEvent::Start {
            partial: self.snapshot(),
        });
    }

    fn open_block(&mut self, block: ContentBlock, kind: BlockKind) -> usize {
        self.start();
        let index = self.message.content.len();
        self.message.content.push(block);
        self.open.push((index, kind));
        index
    }

    fn is_open(&self, index: usize, kind: BlockKind) -> bool {
        self.open.contains(&(index, kind))
    }

    fn mark_closed(&mut self, index: usize) {
        self.open.retain(|(i, _)| *i != index);
    }

    pub fn start_text(&mut self) -> usize {
        let index = self.open_block(ContentBlock::text(""), BlockKind::Text);
        self.stream.push(AssistantMessageEvent::TextStart {
            content_index: index,
            partial: self.snapshot(),
        });
        index
    }

    pub fn text_delta(&mut self, index: usize, delta: &str) {
        if let Some(ContentBlock::Text { text }) = self.message.content.get_mut(index) {
            text.push_str(delta);
            self.stream.push(AssistantMessageEvent::TextDelta {
                content_index: index,
                delta: delta.to_string(),
                partial: self.snapshot(),
            });
        }
    }

    pub fn end_text(&mut self, index: usize) {
        if !self.is_open(index, BlockKind::Text) {
            return;
        }
        self.mark_closed(index);
        let content = self.message.content[index].as_text().unwrap_or_default().to_string();
        self.stream.push(AssistantMessageEvent::TextEnd {
            content_index: index,
            content,
            partial: self.snapshot(),
        });
    }

    pub fn start_thinking(&mut self) -> usize {
        let index = self.open_block(ContentBlock::thinking(""), BlockKind::Thinking);
        self.stream.push(AssistantMessageEvent::ThinkingStart {
            content_index: index,
            partial: self.snapshot(),
        });
        index
    }

    /// Start an opaque reasoning block whose payload is only replayable to
    /// the producing model.
    pub fn start_redacted_thinking(&mut self, payload: impl Into<String>) -> usize {
        let block = ContentBlock::Thinking {
            thinking: String::new(),
            thinking_signature: Some(payload.into()),
            redacted: true,
        };
        let index = self.open_block(block, BlockKind::Thinking);
        self.stream.push(AssistantMessageEvent::ThinkingStart {
            content_index: index,
            partial: self.snapshot(),
        });
        index
    }

    pub fn thinking_delta(&mut self, index: usize, delta: &str) {
        if let Some(ContentBlock::Thinking { thinking, .. }) = self.message.content.get_mut(index) {
            thinking.push_str(delta);
            self.stream.push(AssistantMessageEvent::ThinkingDelta {
                content_index: index,
                delta: delta.to_string(),
                partial: self.snapshot(),
            });
        }
    }

    /// Append to the block's replay signature. No event is emitted.
    pub fn thinking_signature_delta(&mut self, index: usize, delta: &str) {
        if let Some(ContentBlock::Thinking {
            thinking_signature, ..
        }) = self.message.content.get_mut(index)
        {
            thinking_signature.get_or_insert_with(String::new).push_str(delta);
        }
    }

    pub fn end_thinking(&mut self, index: usize) {
        if !self.is_open(index, BlockKind::Thinking) {
            return;
        }
        self.mark_closed(index);
        let content = match &self.message.content[index] {
            ContentBlock::Thinking { thinking, .. } => thinking.clone(),
            _ => String::new(),
        };
        self.stream.push(AssistantMessageEvent::ThinkingEnd {
            content_index: index,
            content,
            partial: self.snapshot(),
        });
    }

    pub fn start_tool_call(&mut self, id: impl Into<String>, name: impl Into<String>) -> usize {
        let call = switchyard_core::message::ToolCall::new(id, name, serde_json::json!({}));
        let index = self.open_block(ContentBlock::ToolCall(call), BlockKind::ToolCall);
        self.tool_args.insert(index, String::new());
        self.stream.push(AssistantMessageEvent::ToolCallStart {
            content_index: index,
            partial: self.snapshot(),
        });
        index
    }

    /// Set the id or name of a tool call whose header arrived late.
    pub fn update_tool_call(&mut self, index: usize, id: Option<&str>, name: Option<&str>) {
        if let Some(ContentBlock::ToolCall(call)) = self.message.content.get_mut(index) {
            if let Some(id) = id {
                call.id = id.to_string();
            }
            if let Some(name) = name {
                call.name = name.to_string();
            }
        }
    }

    /// Append raw argument JSON. The snapshot's arguments are refreshed
    /// whenever the text so far parses.
    pub fn tool_call_delta(&mut self, index: usize, delta: &str) {
        let Some(buffer) = self.tool_args.get_mut(&index) else {
            return;
        };
        buffer.push_str(delta);
        if let Ok(args) = serde_json::from_str::<serde_json::Value>(buffer) {
            if let Some(ContentBlock::ToolCall(call)) = self.message.content.get_mut(index) {
                call.arguments = args;
            }
        }
        self.stream.push(AssistantMessageEvent::ToolCallDelta {
            content_index: index,
            delta: delta.to_string(),
            partial: self.snapshot(),
        });
    }

    pub fn end_tool_call(&mut self, index: usize) {
        if !self.is_open(index, BlockKind::ToolCall) {
            return;
        }
        self.mark_closed(index);
        let raw = self.tool_args.remove(&index).unwrap_or_default();
        let arguments = if raw.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                trace!(error = %e, raw = %raw, "Tool call arguments are not valid JSON");
                serde_json::json!({})
            })
        };
        let Some(ContentBlock::ToolCall(call)) = self.message.content.get_mut(index) else {
            return;
        };
        call.arguments = arguments;
        let tool_call = call.clone();
        self.stream.push(AssistantMessageEvent::ToolCallEnd {
            content_index: index,
            tool_call,
            partial: self.snapshot(),
        });
    }

    fn end_block(&mut self, index: usize, kind: BlockKind) {
        match kind {
            BlockKind::Text => self.end_text(index),
            BlockKind::Thinking => self.end_thinking(index),
            BlockKind::ToolCall => self.end_tool_call(index),
        }
    }

    /// End whatever block is currently open, if any.
    pub fn end_open_blocks(&mut self) {
        while let Some(&(index, kind)) = self.open.first() {
            self.end_block(index, kind);
        }
    }

    pub fn usage_mut(&mut self) -> &mut Usage {
        &mut self.message.usage
    }

    pub fn set_stop_reason(&mut self, reason: StopReason) {
        self.message.stop_reason = reason;
    }

    /// Close open blocks and emit `done` with the final message.
    pub fn finish(mut self) {
        self.end_open_blocks();
        let usage = &mut self.message.usage;
        if usage.total_tokens == 0 {
            usage.total_tokens = usage.input + usage.output + usage.cache_read + usage.cache_write;
        }
        // A turn that requested tools always reports tool use.
        if self.message.stop_reason == StopReason::Stop && !self.message.tool_calls().is_empty() {
            self.message.stop_reason = StopReason::ToolUse;
        }
        let message = self.message;
        self.stream.push(AssistantMessageEvent::Done {
            reason: message.stop_reason,
            message,
        });
    }

    /// Emit a terminal `error` event with whatever content has accumulated.
    pub fn fail(mut self, reason: StopReason, error_message: impl Into<String>) {
        self.message.stop_reason = reason;
        self.message.error_message = Some(error_message.into());
        let message = self.message;
        self.stream.push(AssistantMessageEvent::Error { reason, error: message });
    }
}
