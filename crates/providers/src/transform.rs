//! Cross-provider message normalization.
//!
//! A conversation recorded against one model carries vendor-private artifacts:
//! thinking signatures, redacted reasoning blocks, tool-call ids in the
//! vendor's own format, and occasionally tool calls whose results never
//! arrived. [`transform_messages`] rewrites such a sequence so the target
//! model accepts it.
//!
//! The rewrite runs in two passes:
//! 1. per-message: thinking blocks are kept, dropped or downgraded to text,
//!    foreign `thought_signature`s are stripped, and foreign tool-call ids are
//!    optionally rewritten (results referencing them follow the rewrite);
//! 2. structural: failed assistant turns are dropped, and any tool call still
//!    lacking a result when the next assistant or user message arrives gets a
//!    synthetic error result.
//!
//! The function is pure, and applying it twice for the same target yields the
//! same sequence as applying it once.

use std::collections::HashMap;

use switchyard_core::message::{AssistantMessage, ContentBlock, Message, ToolResultMessage};
use switchyard_core::model::Model;

/// Text of the synthetic result inserted for a tool call that never got one.
pub const NO_RESULT_TEXT: &str = "No result provided";

/// Rewrites a foreign tool-call id: `(id, target_model, source_message)`.
pub type IdNormalizer = dyn Fn(&str, &Model, &AssistantMessage) -> String + Send + Sync;

/// Normalize `messages` for replay against `target`.
pub fn transform_messages(
    messages: &[Message],
    target: &Model,
    normalize_id: Option<&IdNormalizer>,
) -> Vec<Message> {
    let rewritten = rewrite_blocks(messages, target, normalize_id);
    repair_tool_results(rewritten)
}

fn is_same_model(message: &AssistantMessage, target: &Model) -> bool {
    target.is_same(&message.provider, &message.api, &message.model)
}

fn rewrite_blocks(
    messages: &[Message],
    target: &Model,
    normalize_id: Option<&IdNormalizer>,
) -> Vec<Message> {
    let mut id_map: HashMap<String, String> = HashMap::new();

    messages
        .iter()
        .map(|message| match message {
            Message::User(_) => message.clone(),
            Message::ToolResult(result) => match id_map.get(&result.tool_call_id) {
                Some(new_id) => Message::ToolResult(ToolResultMessage {
                    tool_call_id: new_id.clone(),
                    ..result.clone()
                }),
                None => message.clone(),
            },
            Message::Assistant(assistant) => {
                let same = is_same_model(assistant, target);
                let content = assistant
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Thinking {
                            thinking,
                            thinking_signature,
                            redacted,
                        } => rewrite_thinking(block, thinking, thinking_signature.is_some(), *redacted, same),
                        ContentBlock::ToolCall(call) if !same => {
                            let mut call = call.clone();
                            call.thought_signature = None;
                            if let Some(normalize) = normalize_id {
                                let new_id = normalize(&call.id, target, assistant);
                                if new_id != call.id {
                                    id_map.insert(call.id.clone(), new_id.clone());
                                    call.id = new_id;
                                }
                            }
                            Some(ContentBlock::ToolCall(call))
                        }
                        other => Some(other.clone()),
                    })
                    .collect();
                Message::Assistant(AssistantMessage {
                    content,
                    ..assistant.clone()
                })
            }
        })
        .collect()
}

fn rewrite_thinking(
    block: &ContentBlock,
    thinking: &str,
    signed: bool,
    redacted: bool,
    same_model: bool,
) -> Option<ContentBlock> {
    if redacted {
        return same_model.then(|| block.clone());
    }
    if signed && same_model {
        return Some(block.clone());
    }
    if thinking.trim().is_empty() {
        return None;
    }
    if same_model {
        return Some(block.clone());
    }
    Some(ContentBlock::text(thinking))
}

fn repair_tool_results(messages: Vec<Message>) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    // (call id, tool name, timestamp of the assistant message that made the call)
    let mut pending: Vec<(String, String, chrono::DateTime<chrono::Utc>)> = Vec::new();

    for message in messages {
        match &message {
            Message::Assistant(assistant) if assistant.stop_reason.is_failure() => continue,
            Message::Assistant(assistant) => {
                flush_pending(&mut pending, &mut out);
                pending = assistant
                    .tool_calls()
                    .into_iter()
                    .map(|call| (call.id.clone(), call.name.clone(), assistant.timestamp))
                    .collect();
            }
            Message::User(_) => flush_pending(&mut pending, &mut out),
            Message::ToolResult(result) => pending.retain(|(id, _, _)| id != &result.tool_call_id),
        }
        out.push(message);
    }

    out
}

fn flush_pending(
    pending: &mut Vec<(String, String, chrono::DateTime<chrono::Utc>)>,
    out: &mut Vec<Message>,
) {
    for (id, name, timestamp) in pending.drain(..) {
        let mut synthetic = ToolResultMessage::error(id, name, NO_RESULT_TEXT);
        synthetic.timestamp = timestamp;
        out.push(Message::ToolResult(synthetic));
    }
}

fn sanitize_id(id: &str, max_len: usize) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .take(max_len)
        .collect()
}

/// Anthropic accepts tool-use ids of at most 64 characters from `[A-Za-z0-9_-]`.
pub fn normalize_anthropic_tool_call_id(id: &str) -> String {
    sanitize_id(id, 64)
}

/// OpenAI-compatible endpoints reject composite `call|item` ids and anything
/// longer than 40 characters.
pub fn normalize_openai_tool_call_id(id: &str) -> String {
    let head = id.split('|').next().unwrap_or(id);
    sanitize_id(head, 40)
}
