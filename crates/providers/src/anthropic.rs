//! Anthropic Messages API adapter.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks, with
//!   consecutive tool results merged into one user turn
//! - Extended thinking, including signed and redacted thinking replay
//! - Streaming via SSE (`message_start`, `content_block_*`, `message_delta`,
//!   `message_stop`)

use std::collections::HashMap;
use std::ops::ControlFlow;

use serde::Serialize;
use switchyard_core::error::ProviderError;
use switchyard_core::message::{AssistantMessage, ContentBlock, Message, StopReason};
use switchyard_core::model::{Api, Model};
use switchyard_core::provider::{
    AssistantMessageEventStream, Context, SimpleStreamOptions, StreamOptions, ThinkingLevel, ToolDefinition,
    assistant_message_stream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::partial::PartialMessage;
use crate::registry::ApiAdapter;
use crate::sse::{SseEvent, StreamOutcome, open_event_stream, read_events};
use crate::transform::{normalize_anthropic_tool_call_id, transform_messages};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Streaming adapter for [`Api::AnthropicMessages`].
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    client: reqwest::Client,
}

impl Default for AnthropicAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("switchyard/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Use a preconfigured HTTP client (proxies, custom TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build the JSON request body. Pure; runs the message normalizer first.
    pub fn build_request_body(
        model: &Model,
        context: &Context,
        options: &StreamOptions,
        reasoning: Option<ThinkingLevel>,
    ) -> serde_json::Value {
        let normalize = |id: &str, _: &Model, _: &AssistantMessage| normalize_anthropic_tool_call_id(id);
        let messages = transform_messages(&context.messages, model, Some(&normalize));

        let mut max_tokens = options.max_tokens.unwrap_or(model.max_tokens);
        let thinking_budget = reasoning.filter(|_| model.reasoning).map(ThinkingLevel::budget_tokens);
        if let Some(budget) = thinking_budget {
            if max_tokens <= budget {
                max_tokens = budget + DEFAULT_MAX_TOKENS;
            }
        }

        let mut body = serde_json::json!({
            "model": model.id,
            "messages": encode_messages(&messages),
            "max_tokens": max_tokens,
            "stream": true,
        });

        if let Some(system) = context.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            body["system"] = serde_json::json!(system);
        }

        if !context.tools.is_empty() {
            body["tools"] = serde_json::json!(encode_tools(&context.tools));
        }

        match thinking_budget {
            Some(budget) => {
                body["thinking"] = serde_json::json!({
                    "type": "enabled",
                    "budget_tokens": budget
                });
            }
            None => {
                if let Some(temperature) = options.temperature {
                    body["temperature"] = serde_json::json!(temperature);
                }
            }
        }

        for (key, value) in &options.extra {
            body[key.as_str()] = value.clone();
        }

        body
    }

    fn start(
        &self,
        model: &Model,
        context: &Context,
        options: StreamOptions,
        reasoning: Option<ThinkingLevel>,
    ) -> AssistantMessageEventStream {
        let stream = assistant_message_stream();
        let partial = PartialMessage::new(model, stream.clone());

        let Some(api_key) = options.api_key.clone() else {
            partial.fail(
                StopReason::Error,
                ProviderError::AuthenticationFailed(format!("No API key for provider: {}", model.provider))
                    .to_string(),
            );
            return stream;
        };

        let base_url = if model.base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            model.base_url.as_str()
        };
        let url = format!("{base_url}/v1/messages");
        let body = Self::build_request_body(model, context, &options, reasoning);

        debug!(provider = "anthropic", model = %model.id, "Sending streaming request");

        let mut request = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body);
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        tokio::spawn(run_stream(request, options.cancel, partial));
        stream
    }
}

impl ApiAdapter for AnthropicAdapter {
    fn api(&self) -> Api {
        Api::AnthropicMessages
    }

    fn stream(&self, model: &Model, context: &Context, options: StreamOptions) -> AssistantMessageEventStream {
        self.start(model, context, options, None)
    }

    fn stream_simple(
        &self,
        model: &Model,
        context: &Context,
        options: SimpleStreamOptions,
    ) -> AssistantMessageEventStream {
        self.start(model, context, options.base, options.reasoning)
    }
}

async fn run_stream(request: reqwest::RequestBuilder, cancel: CancellationToken, mut partial: PartialMessage) {
    let response = match open_event_stream(request, &cancel, "Anthropic").await {
        Ok(Some(response)) => response,
        Ok(None) => return partial.fail(StopReason::Aborted, "Request was aborted"),
        Err(e) => {
            warn!(error = %e, "Anthropic request failed");
            return partial.fail(StopReason::Error, e.to_string());
        }
    };

    partial.start();
    let mut state = StreamState::default();
    let outcome = read_events(response, &cancel, |event| state.handle(&mut partial, event)).await;

    match outcome {
        StreamOutcome::Finished => partial.finish(),
        StreamOutcome::Eof if state.stop_reason_seen => partial.finish(),
        StreamOutcome::Eof => partial.fail(StopReason::Error, "Stream ended before message_stop"),
        StreamOutcome::Aborted => partial.fail(StopReason::Aborted, "Request was aborted"),
        StreamOutcome::Failed(e) => {
            warn!(error = %e, "Anthropic stream failed");
            partial.fail(StopReason::Error, e.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

/// Per-response bookkeeping: vendor block index → our content index.
#[derive(Debug, Default)]
struct StreamState {
    blocks: HashMap<u64, (usize, BlockKind)>,
    stop_reason_seen: bool,
}

impl StreamState {
    fn handle(&mut self, partial: &mut PartialMessage, event: SseEvent) -> Result<ControlFlow<()>, ProviderError> {
        let data: serde_json::Value = match serde_json::from_str(&event.data) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, data = %event.data, "Ignoring unparseable Anthropic SSE");
                return Ok(ControlFlow::Continue(()));
            }
        };

        match data["type"].as_str().unwrap_or("") {
            "message_start" => {
                let usage = &data["message"]["usage"];
                let target = partial.usage_mut();
                target.input = token_count(&usage["input_tokens"]);
                target.output = token_count(&usage["output_tokens"]);
                target.cache_read = token_count(&usage["cache_read_input_tokens"]);
                target.cache_write = token_count(&usage["cache_creation_input_tokens"]);
            }
            "content_block_start" => {
                let vendor_index = data["index"].as_u64().unwrap_or(0);
                let block = &data["content_block"];
                let entry = match block["type"].as_str().unwrap_or("") {
                    "text" => (partial.start_text(), BlockKind::Text),
                    "thinking" => (partial.start_thinking(), BlockKind::Thinking),
                    "redacted_thinking" => (
                        partial.start_redacted_thinking(block["data"].as_str().unwrap_or("")),
                        BlockKind::Thinking,
                    ),
                    "tool_use" => (
                        partial.start_tool_call(
                            block["id"].as_str().unwrap_or(""),
                            block["name"].as_str().unwrap_or(""),
                        ),
                        BlockKind::ToolUse,
                    ),
                    other => {
                        trace!(block_type = other, "Ignoring unknown Anthropic content block");
                        return Ok(ControlFlow::Continue(()));
                    }
                };
                self.blocks.insert(vendor_index, entry);
            }
            "content_block_delta" => {
                let vendor_index = data["index"].as_u64().unwrap_or(0);
                let Some(&(index, _)) = self.blocks.get(&vendor_index) else {
                    return Ok(ControlFlow::Continue(()));
                };
                let delta = &data["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => partial.text_delta(index, delta["text"].as_str().unwrap_or("")),
                    "thinking_delta" => partial.thinking_delta(index, delta["thinking"].as_str().unwrap_or("")),
                    "signature_delta" => {
                        partial.thinking_signature_delta(index, delta["signature"].as_str().unwrap_or(""))
                    }
                    "input_json_delta" => partial.tool_call_delta(index, delta["partial_json"].as_str().unwrap_or("")),
                    _ => {}
                }
            }
            "content_block_stop" => {
                let vendor_index = data["index"].as_u64().unwrap_or(0);
                if let Some((index, kind)) = self.blocks.remove(&vendor_index) {
                    match kind {
                        BlockKind::Text => partial.end_text(index),
                        BlockKind::Thinking => partial.end_thinking(index),
                        BlockKind::ToolUse => partial.end_tool_call(index),
                    }
                }
            }
            "message_delta" => {
                if let Some(reason) = data["delta"]["stop_reason"].as_str() {
                    partial.set_stop_reason(map_stop_reason(reason));
                    self.stop_reason_seen = true;
                }
                let usage = &data["usage"];
                if let Some(output) = usage["output_tokens"].as_u64() {
                    partial.usage_mut().output = output as u32;
                }
                if let Some(input) = usage["input_tokens"].as_u64() {
                    partial.usage_mut().input = input as u32;
                }
            }
            "message_stop" => return Ok(ControlFlow::Break(())),
            "error" => {
                let message = data["error"]["message"].as_str().unwrap_or("Unknown Anthropic error");
                return Err(ProviderError::StreamInterrupted(message.to_string()));
            }
            _ => {}
        }
        Ok(ControlFlow::Continue(()))
    }
}

fn token_count(value: &serde_json::Value) -> u32 {
    value.as_u64().unwrap_or(0) as u32
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "max_tokens" => StopReason::Length,
        "tool_use" => StopReason::ToolUse,
        "refusal" => StopReason::Error,
        // end_turn, stop_sequence, pause_turn
        _ => StopReason::Stop,
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
    RedactedThinking {
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<WireBlock>,
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    r#type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

fn encode_user_blocks(content: &[ContentBlock]) -> Vec<WireBlock> {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => Some(WireBlock::Text { text: text.clone() }),
            ContentBlock::Image { data, mime_type } => Some(WireBlock::Image {
                source: ImageSource {
                    r#type: "base64",
                    media_type: mime_type.clone(),
                    data: data.clone(),
                },
            }),
            _ => None,
        })
        .collect()
}

fn encode_assistant_blocks(content: &[ContentBlock]) -> Vec<WireBlock> {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => Some(WireBlock::Text { text: text.clone() }),
            ContentBlock::Thinking {
                thinking_signature: Some(data),
                redacted: true,
                ..
            } => Some(WireBlock::RedactedThinking { data: data.clone() }),
            ContentBlock::Thinking {
                thinking,
                thinking_signature: Some(signature),
                ..
            } if !signature.is_empty() => Some(WireBlock::Thinking {
                thinking: thinking.clone(),
                signature: signature.clone(),
            }),
            // Unsigned reasoning is rejected as thinking; replay it as text.
            ContentBlock::Thinking { thinking, .. } if !thinking.trim().is_empty() => {
                Some(WireBlock::Text { text: thinking.clone() })
            }
            ContentBlock::ToolCall(call) => Some(WireBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Convert canonical messages to Anthropic API messages.
fn encode_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut result: Vec<AnthropicMessage> = Vec::new();
    let mut previous_was_tool_result = false;

    for msg in messages {
        match msg {
            Message::User(user) => {
                previous_was_tool_result = false;
                let content = encode_user_blocks(&user.content);
                if !content.is_empty() {
                    result.push(AnthropicMessage { role: "user", content });
                }
            }
            Message::Assistant(assistant) => {
                previous_was_tool_result = false;
                let content = encode_assistant_blocks(&assistant.content);
                if !content.is_empty() {
                    result.push(AnthropicMessage {
                        role: "assistant",
                        content,
                    });
                }
            }
            Message::ToolResult(tool_result) => {
                let mut content = encode_user_blocks(&tool_result.content);
                if content.is_empty() {
                    content.push(WireBlock::Text {
                        text: "(no output)".into(),
                    });
                }
                let block = WireBlock::ToolResult {
                    tool_use_id: tool_result.tool_call_id.clone(),
                    content,
                    is_error: tool_result.is_error,
                };
                // Tool results go back as user turns; consecutive ones share a turn.
                match result.last_mut() {
                    Some(last) if previous_was_tool_result => last.content.push(block),
                    _ => result.push(AnthropicMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
                previous_was_tool_result = true;
            }
        }
    }

    result
}

/// Convert tool definitions to Anthropic format.
fn encode_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .map(|t| AnthropicTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.parameters.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use switchyard_core::message::{ToolCall, ToolResultMessage};
    use switchyard_core::provider::AssistantMessageEvent;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn claude() -> Model {
        Model::new("claude-sonnet-4-20250514", Api::AnthropicMessages, "anthropic")
    }

    fn tool_result(id: &str, text: &str) -> Message {
        let mut r = ToolResultMessage::error(id, "search", text);
        r.is_error = false;
        Message::ToolResult(r)
    }

    #[test]
    fn request_body_basics() {
        let context = Context {
            system_prompt: Some("You are helpful".into()),
            messages: vec![Message::user("Hello")],
            tools: vec![ToolDefinition {
                name: "calculator".into(),
                description: "Evaluate math".into(),
                parameters: json!({"type": "object", "properties": {"expression": {"type": "string"}}}),
            }],
        };
        let options = StreamOptions {
            temperature: Some(0.2),
            ..Default::default()
        };
        let body = AnthropicAdapter::build_request_body(&claude(), &context, &options, None);

        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert!(body.get("thinking").is_none());
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn thinking_budget_only_for_reasoning_models() {
        let context = Context {
            messages: vec![Message::user("think")],
            ..Default::default()
        };
        let plain = AnthropicAdapter::build_request_body(
            &claude(),
            &context,
            &StreamOptions::default(),
            Some(ThinkingLevel::High),
        );
        assert!(plain.get("thinking").is_none());

        let body = AnthropicAdapter::build_request_body(
            &claude().with_reasoning(true),
            &context,
            &StreamOptions::default(),
            Some(ThinkingLevel::High),
        );
        assert_eq!(body["thinking"]["budget_tokens"], 16384);
        assert!(body["max_tokens"].as_u64().unwrap() > 16384);
    }

    #[test]
    fn tool_results_merge_into_one_user_turn() {
        let mut assistant = AssistantMessage::empty(Api::AnthropicMessages, "anthropic", "claude-sonnet-4-20250514");
        assistant.content = vec![
            ContentBlock::text("Let me search"),
            ContentBlock::ToolCall(ToolCall::new("toolu_1", "search", json!({"q": "a"}))),
            ContentBlock::ToolCall(ToolCall::new("toolu_2", "search", json!({"q": "b"}))),
        ];
        assistant.stop_reason = StopReason::ToolUse;
        let context = Context {
            messages: vec![
                Message::user("find things"),
                Message::Assistant(assistant),
                tool_result("toolu_1", "first"),
                tool_result("toolu_2", "second"),
            ],
            ..Default::default()
        };
        let body = AnthropicAdapter::build_request_body(&claude(), &context, &StreamOptions::default(), None);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][1]["input"]["q"], "a");
        assert_eq!(messages[2]["role"], "user");
        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "toolu_1");
        assert_eq!(results[1]["content"][0]["text"], "second");
    }

    #[test]
    fn foreign_history_is_normalized_before_encoding() {
        let mut foreign = AssistantMessage::empty(Api::OpenAiResponses, "openai", "gpt-5");
        foreign.content = vec![
            ContentBlock::Thinking {
                thinking: "reasoning".into(),
                thinking_signature: Some("enc".into()),
                redacted: false,
            },
            ContentBlock::ToolCall(ToolCall::new("call_1|fc/2", "search", json!({}))),
        ];
        let context = Context {
            messages: vec![Message::user("q"), Message::Assistant(foreign), tool_result("call_1|fc/2", "r")],
            ..Default::default()
        };
        let body = AnthropicAdapter::build_request_body(&claude(), &context, &StreamOptions::default(), None);

        let assistant = &body["messages"][1]["content"];
        assert_eq!(assistant[0]["type"], "text");
        assert_eq!(assistant[0]["text"], "reasoning");
        assert_eq!(assistant[1]["id"], "call_1_fc_2");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "call_1_fc_2");
    }

    #[test]
    fn same_model_replays_signed_and_redacted_thinking() {
        let mut own = AssistantMessage::empty(Api::AnthropicMessages, "anthropic", "claude-sonnet-4-20250514");
        own.content = vec![
            ContentBlock::Thinking {
                thinking: "plan".into(),
                thinking_signature: Some("sig".into()),
                redacted: false,
            },
            ContentBlock::Thinking {
                thinking: String::new(),
                thinking_signature: Some("opaque".into()),
                redacted: true,
            },
            ContentBlock::text("answer"),
        ];
        let context = Context {
            messages: vec![Message::user("q"), Message::Assistant(own)],
            ..Default::default()
        };
        let body = AnthropicAdapter::build_request_body(&claude(), &context, &StreamOptions::default(), None);
        let blocks = &body["messages"][1]["content"];
        assert_eq!(blocks[0]["type"], "thinking");
        assert_eq!(blocks[0]["signature"], "sig");
        assert_eq!(blocks[1]["type"], "redacted_thinking");
        assert_eq!(blocks[1]["data"], "opaque");
    }

    #[test]
    fn stop_reason_mapping() {
        assert_eq!(map_stop_reason("end_turn"), StopReason::Stop);
        assert_eq!(map_stop_reason("max_tokens"), StopReason::Length);
        assert_eq!(map_stop_reason("tool_use"), StopReason::ToolUse);
    }

    fn sse(events: &[(&str, serde_json::Value)]) -> String {
        events
            .iter()
            .map(|(name, data)| format!("event: {name}\ndata: {data}\n\n"))
            .collect()
    }

    async fn mock_server(status: u16, body: String) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(
                ResponseTemplate::new(status)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;
        server
    }

    fn options() -> StreamOptions {
        StreamOptions {
            api_key: Some("test_api_key".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn streams_text_thinking_and_tool_use() {
        let body = sse(&[
            (
                "message_start",
                json!({"type": "message_start", "message": {"usage": {"input_tokens": 12, "output_tokens": 1}}}),
            ),
            (
                "content_block_start",
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}),
            ),
            (
                "content_block_delta",
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "Need a tool"}}),
            ),
            (
                "content_block_delta",
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "signature_delta", "signature": "sig=="}}),
            ),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            (
                "content_block_start",
                json!({"type": "content_block_start", "index": 1, "content_block": {"type": "text", "text": ""}}),
            ),
            (
                "content_block_delta",
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "text_delta", "text": "Checking"}}),
            ),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 1})),
            (
                "content_block_start",
                json!({"type": "content_block_start", "index": 2, "content_block": {"type": "tool_use", "id": "toolu_9", "name": "calculator", "input": {}}}),
            ),
            (
                "content_block_delta",
                json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "{\"expression\":"}}),
            ),
            (
                "content_block_delta",
                json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": " \"2+2\"}"}}),
            ),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 2})),
            (
                "message_delta",
                json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 30}}),
            ),
            ("message_stop", json!({"type": "message_stop"})),
        ]);
        let server = mock_server(200, body).await;
        let model = claude().with_base_url(server.uri());
        let context = Context {
            messages: vec![Message::user("2+2?")],
            ..Default::default()
        };

        let stream = AnthropicAdapter::new().stream(&model, &context, options());
        let events: Vec<_> = stream.clone().collect().await;

        assert!(matches!(events.first(), Some(AssistantMessageEvent::Start { .. })));
        assert!(matches!(events.last(), Some(AssistantMessageEvent::Done { .. })));
        assert!(events.iter().any(|e| matches!(e, AssistantMessageEvent::ToolCallEnd { tool_call, .. } if tool_call.id == "toolu_9")));

        let message = stream.result().await.unwrap();
        assert_eq!(message.stop_reason, StopReason::ToolUse);
        assert_eq!(message.usage.input, 12);
        assert_eq!(message.usage.output, 30);
        assert_eq!(message.text(), "Checking");
        match &message.content[0] {
            ContentBlock::Thinking {
                thinking,
                thinking_signature,
                ..
            } => {
                assert_eq!(thinking, "Need a tool");
                assert_eq!(thinking_signature.as_deref(), Some("sig=="));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(message.tool_calls()[0].arguments["expression"], "2+2");
    }

    #[tokio::test]
    async fn http_errors_become_error_events() {
        let server = mock_server(401, "{\"error\":\"bad key\"}".into()).await;
        let model = claude().with_base_url(server.uri());
        let stream = AnthropicAdapter::new().stream(&model, &Context::default(), options());

        let message = stream.result().await.unwrap();
        assert_eq!(message.stop_reason, StopReason::Error);
        assert!(message.error_message.unwrap().contains("Authentication failed"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_immediately() {
        let stream = AnthropicAdapter::new().stream(&claude(), &Context::default(), StreamOptions::default());
        assert!(stream.is_done());
        let message = stream.result().await.unwrap();
        assert_eq!(message.stop_reason, StopReason::Error);
    }

    #[tokio::test]
    async fn cancelled_request_reports_aborted() {
        let server = mock_server(200, String::new()).await;
        let model = claude().with_base_url(server.uri());
        let options = options();
        options.cancel.cancel();

        let stream = AnthropicAdapter::new().stream(&model, &Context::default(), options);
        let message = stream.result().await.unwrap();
        assert_eq!(message.stop_reason, StopReason::Aborted);
    }
}
