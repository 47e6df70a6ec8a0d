//! OpenAI-compatible Chat Completions adapter.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, Fireworks AI,
//! and any endpoint exposing `/chat/completions` with SSE streaming.
//!
//! Supports:
//! - Tool use / function calling (`tool_calls`, `tool` role)
//! - Reasoning deltas (`reasoning_content` / `reasoning`) and `reasoning_effort`
//! - Image parts as data URLs
//! - Usage reporting via `stream_options.include_usage`

use std::collections::HashMap;
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
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
use crate::transform::{normalize_openai_tool_call_id, transform_messages};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Streaming adapter for [`Api::OpenAiCompletions`].
///
/// This handles the vast majority of hosted and local providers since most
/// expose an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatAdapter {
    client: reqwest::Client,
}

impl Default for OpenAiCompatAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiCompatAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("switchyard/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

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
        let normalize = |id: &str, _: &Model, _: &AssistantMessage| normalize_openai_tool_call_id(id);
        let messages = transform_messages(&context.messages, model, Some(&normalize));

        let mut body = serde_json::json!({
            "model": model.id,
            "messages": encode_messages(context.system_prompt.as_deref(), &messages),
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if let Some(temperature) = options.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if !context.tools.is_empty() {
            body["tools"] = serde_json::json!(encode_tools(&context.tools));
        }

        if let Some(level) = reasoning.filter(|_| model.reasoning) {
            body["reasoning_effort"] = serde_json::json!(level.as_str());
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

        let base_url = if model.base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            model.base_url.as_str()
        };
        let url = format!("{base_url}/chat/completions");
        let body = Self::build_request_body(model, context, &options, reasoning);

        debug!(provider = %model.provider, model = %model.id, "Sending streaming request");

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        // Local servers (Ollama, vLLM) accept unauthenticated requests.
        if let Some(api_key) = &options.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        tokio::spawn(run_stream(request, options.cancel, partial, model.provider.clone()));
        stream
    }
}

impl ApiAdapter for OpenAiCompatAdapter {
    fn api(&self) -> Api {
        Api::OpenAiCompletions
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

async fn run_stream(
    request: reqwest::RequestBuilder,
    cancel: CancellationToken,
    mut partial: PartialMessage,
    provider: String,
) {
    let response = match open_event_stream(request, &cancel, &provider).await {
        Ok(Some(response)) => response,
        Ok(None) => return partial.fail(StopReason::Aborted, "Request was aborted"),
        Err(e) => {
            warn!(provider = %provider, error = %e, "Request failed");
            return partial.fail(StopReason::Error, e.to_string());
        }
    };

    partial.start();
    let mut state = StreamState::default();
    let outcome = read_events(response, &cancel, |event| state.handle(&mut partial, event)).await;

    match outcome {
        StreamOutcome::Finished => partial.finish(),
        StreamOutcome::Eof if state.finish_reason_seen => partial.finish(),
        StreamOutcome::Eof => partial.fail(StopReason::Error, "Stream ended before a finish reason"),
        StreamOutcome::Aborted => partial.fail(StopReason::Aborted, "Request was aborted"),
        StreamOutcome::Failed(e) => {
            warn!(provider = %provider, error = %e, "Stream failed");
            partial.fail(StopReason::Error, e.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Current {
    Text(usize),
    Thinking(usize),
    ToolCall(usize),
}

/// Per-response bookkeeping. Chat Completions has no explicit block
/// boundaries, so a block ends when a delta of a different kind arrives.
#[derive(Debug, Default)]
struct StreamState {
    current: Option<Current>,
    /// Vendor tool-call index → our content index
    tool_blocks: HashMap<u32, usize>,
    finish_reason_seen: bool,
}

impl StreamState {
    fn handle(&mut self, partial: &mut PartialMessage, event: SseEvent) -> Result<ControlFlow<()>, ProviderError> {
        let data = event.data.trim();
        // "[DONE]" signals end of stream
        if data == "[DONE]" {
            return Ok(ControlFlow::Break(()));
        }

        let chunk: StreamResponse = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return Ok(ControlFlow::Continue(()));
            }
        };

        if let Some(error) = chunk.error {
            return Err(ProviderError::StreamInterrupted(error.message));
        }

        if let Some(usage) = chunk.usage {
            let cached = usage.prompt_tokens_details.map(|d| d.cached_tokens).unwrap_or(0);
            let target = partial.usage_mut();
            target.input = usage.prompt_tokens.saturating_sub(cached);
            target.output = usage.completion_tokens;
            target.cache_read = cached;
            target.total_tokens = usage.total_tokens;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(ControlFlow::Continue(()));
        };
        let delta = choice.delta;

        let reasoning = delta
            .reasoning_content
            .filter(|r| !r.is_empty())
            .or(delta.reasoning.filter(|r| !r.is_empty()));
        if let Some(reasoning) = reasoning {
            let index = match self.current {
                Some(Current::Thinking(index)) => index,
                _ => {
                    partial.end_open_blocks();
                    let index = partial.start_thinking();
                    self.current = Some(Current::Thinking(index));
                    index
                }
            };
            partial.thinking_delta(index, &reasoning);
        }

        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            let index = match self.current {
                Some(Current::Text(index)) => index,
                _ => {
                    partial.end_open_blocks();
                    let index = partial.start_text();
                    self.current = Some(Current::Text(index));
                    index
                }
            };
            partial.text_delta(index, &content);
        }

        for tool_delta in delta.tool_calls.unwrap_or_default() {
            let function = tool_delta.function.unwrap_or_default();
            let index = match self.tool_blocks.get(&tool_delta.index) {
                Some(&index) => {
                    partial.update_tool_call(index, tool_delta.id.as_deref(), function.name.as_deref());
                    index
                }
                None => {
                    partial.end_open_blocks();
                    let index = partial.start_tool_call(
                        tool_delta.id.unwrap_or_default(),
                        function.name.unwrap_or_default(),
                    );
                    self.tool_blocks.insert(tool_delta.index, index);
                    index
                }
            };
            self.current = Some(Current::ToolCall(index));
            if let Some(arguments) = function.arguments.filter(|a| !a.is_empty()) {
                partial.tool_call_delta(index, &arguments);
            }
        }

        if let Some(reason) = choice.finish_reason {
            partial.set_stop_reason(map_finish_reason(&reason));
            self.finish_reason_seen = true;
        }

        Ok(ControlFlow::Continue(()))
    }
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "length" => StopReason::Length,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "content_filter" => StopReason::Error,
        _ => StopReason::Stop,
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn new(role: &'static str, content: ApiContent) -> Self {
        Self {
            role,
            content: Some(content),
            reasoning_content: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    r#type: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: &'static str,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

fn image_part(data: &str, mime_type: &str) -> ApiPart {
    ApiPart::ImageUrl {
        image_url: ImageUrl {
            url: format!("data:{mime_type};base64,{data}"),
        },
    }
}

fn encode_user(content: &[ContentBlock]) -> Option<ApiContent> {
    if let [ContentBlock::Text { text }] = content {
        return Some(ApiContent::Text(text.clone()));
    }
    let parts: Vec<ApiPart> = content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.is_empty() => Some(ApiPart::Text { text: text.clone() }),
            ContentBlock::Image { data, mime_type } => Some(image_part(data, mime_type)),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then_some(ApiContent::Parts(parts))
}

fn encode_assistant(assistant: &AssistantMessage) -> Option<ApiMessage> {
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    for block in &assistant.content {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::Thinking { thinking, redacted: false, .. } => reasoning.push_str(thinking),
            ContentBlock::ToolCall(call) => tool_calls.push(ApiToolCall {
                id: call.id.clone(),
                r#type: "function",
                function: ApiFunction {
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                },
            }),
            _ => {}
        }
    }

    if text.trim().is_empty() && tool_calls.is_empty() {
        return None;
    }
    Some(ApiMessage {
        role: "assistant",
        content: (!text.is_empty()).then_some(ApiContent::Text(text)),
        reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    })
}

/// Convert canonical messages to OpenAI API format.
///
/// Tool results cannot carry images, so images returned by a run of tool
/// results are forwarded in a user message right after the run.
fn encode_messages(system_prompt: Option<&str>, messages: &[Message]) -> Vec<ApiMessage> {
    let mut result = Vec::new();
    let mut pending_images: Vec<ApiPart> = Vec::new();

    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        result.push(ApiMessage::new("system", ApiContent::Text(system.to_string())));
    }

    for msg in messages {
        if !matches!(msg, Message::ToolResult(_)) {
            flush_images(&mut pending_images, &mut result);
        }
        match msg {
            Message::User(user) => {
                if let Some(content) = encode_user(&user.content) {
                    result.push(ApiMessage::new("user", content));
                }
            }
            Message::Assistant(assistant) => {
                if let Some(message) = encode_assistant(assistant) {
                    result.push(message);
                }
            }
            Message::ToolResult(tool_result) => {
                let mut text = Vec::new();
                for block in &tool_result.content {
                    match block {
                        ContentBlock::Text { text: t } => text.push(t.as_str()),
                        ContentBlock::Image { data, mime_type } => pending_images.push(image_part(data, mime_type)),
                        _ => {}
                    }
                }
                let text = if text.is_empty() {
                    "(see attached image)".to_string()
                } else {
                    text.join("\n")
                };
                result.push(ApiMessage {
                    tool_call_id: Some(tool_result.tool_call_id.clone()),
                    ..ApiMessage::new("tool", ApiContent::Text(text))
                });
            }
        }
    }
    flush_images(&mut pending_images, &mut result);

    result
}

fn flush_images(pending: &mut Vec<ApiPart>, result: &mut Vec<ApiMessage>) {
    if pending.is_empty() {
        return;
    }
    let mut parts = vec![ApiPart::Text {
        text: "Attached image(s) from tool result:".into(),
    }];
    parts.append(pending);
    result.push(ApiMessage::new("user", ApiContent::Parts(parts)));
}

/// Convert tool definitions to OpenAI API format.
fn encode_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function",
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunction>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
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

    fn gpt() -> Model {
        Model::new("gpt-4o", Api::OpenAiCompletions, "openai")
    }

    #[test]
    fn request_body_basics() {
        let context = Context {
            system_prompt: Some("Be brief".into()),
            messages: vec![Message::user("Hello")],
            tools: vec![ToolDefinition {
                name: "shell".into(),
                description: "Run a command".into(),
                parameters: json!({"type": "object"}),
            }],
        };
        let options = StreamOptions {
            max_tokens: Some(256),
            ..Default::default()
        };
        let body = OpenAiCompatAdapter::build_request_body(&gpt(), &context, &options, Some(ThinkingLevel::Low));

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "shell");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stream_options"]["include_usage"], true);
        // gpt-4o is not flagged as a reasoning model
        assert!(body.get("reasoning_effort").is_none());

        let body = OpenAiCompatAdapter::build_request_body(
            &gpt().with_reasoning(true),
            &context,
            &options,
            Some(ThinkingLevel::Low),
        );
        assert_eq!(body["reasoning_effort"], "low");
    }

    #[test]
    fn tool_round_trip_encoding() {
        let mut assistant = AssistantMessage::empty(Api::OpenAiCompletions, "openai", "gpt-4o");
        assistant.content = vec![ContentBlock::ToolCall(ToolCall::new("call_1", "shell", json!({"cmd": "ls"})))];
        let mut result = ToolResultMessage::error("call_1", "shell", "a.txt");
        result.is_error = false;
        result.content.push(ContentBlock::image("AAAA", "image/png"));

        let context = Context {
            messages: vec![
                Message::user("list"),
                Message::Assistant(assistant),
                Message::ToolResult(result),
            ],
            ..Default::default()
        };
        let body = OpenAiCompatAdapter::build_request_body(&gpt(), &context, &StreamOptions::default(), None);
        let messages = body["messages"].as_array().unwrap();

        assert_eq!(messages[1]["role"], "assistant");
        assert!(messages[1].get("content").is_none());
        assert_eq!(messages[1]["tool_calls"][0]["function"]["arguments"], "{\"cmd\":\"ls\"}");
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["tool_call_id"], "call_1");
        assert_eq!(messages[2]["content"], "a.txt");
        assert_eq!(messages[3]["role"], "user");
        assert_eq!(messages[3]["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn foreign_ids_are_shortened() {
        let mut foreign = AssistantMessage::empty(Api::OpenAiResponses, "openai", "gpt-5");
        foreign.content = vec![ContentBlock::ToolCall(ToolCall::new("call_1|fc_abc", "shell", json!({})))];
        let context = Context {
            messages: vec![
                Message::user("q"),
                Message::Assistant(foreign),
                Message::ToolResult(ToolResultMessage::error("call_1|fc_abc", "shell", "boom")),
            ],
            ..Default::default()
        };
        let body = OpenAiCompatAdapter::build_request_body(&gpt(), &context, &StreamOptions::default(), None);
        assert_eq!(body["messages"][1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason("stop"), StopReason::Stop);
        assert_eq!(map_finish_reason("length"), StopReason::Length);
        assert_eq!(map_finish_reason("tool_calls"), StopReason::ToolUse);
    }

    fn sse(chunks: &[serde_json::Value]) -> String {
        let mut body: String = chunks.iter().map(|c| format!("data: {c}\n\n")).collect();
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn mock_server(status: u16, body: String) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
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
            api_key: Some("test-key".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn streams_reasoning_text_and_tool_calls() {
        let body = sse(&[
            json!({"choices": [{"delta": {"reasoning_content": "thinking..."}}]}),
            json!({"choices": [{"delta": {"content": "Let me "}}]}),
            json!({"choices": [{"delta": {"content": "check."}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_a", "function": {"name": "shell", "arguments": ""}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"cmd\":"}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "\"ls\"}"}}]}}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 20, "completion_tokens": 7, "total_tokens": 27, "prompt_tokens_details": {"cached_tokens": 5}}}),
        ]);
        let server = mock_server(200, body).await;
        let model = gpt().with_base_url(server.uri());
        let context = Context {
            messages: vec![Message::user("ls please")],
            ..Default::default()
        };

        let stream = OpenAiCompatAdapter::new().stream(&model, &context, options());
        let events: Vec<_> = stream.clone().collect().await;

        let starts = events.iter().filter(|e| matches!(e, AssistantMessageEvent::Start { .. })).count();
        assert_eq!(starts, 1);
        assert!(events.iter().any(|e| matches!(e, AssistantMessageEvent::ThinkingEnd { .. })));
        assert!(events.iter().any(|e| matches!(e, AssistantMessageEvent::TextEnd { content, .. } if content == "Let me check.")));

        let message = stream.result().await.unwrap();
        assert_eq!(message.stop_reason, StopReason::ToolUse);
        assert_eq!(message.content.len(), 3);
        let calls = message.tool_calls();
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].arguments["cmd"], "ls");
        assert_eq!(message.usage.input, 15);
        assert_eq!(message.usage.cache_read, 5);
        assert_eq!(message.usage.total_tokens, 27);
    }

    #[tokio::test]
    async fn server_errors_become_error_events() {
        let server = mock_server(500, "upstream exploded".into()).await;
        let model = gpt().with_base_url(server.uri());
        let stream = OpenAiCompatAdapter::new().stream(&model, &Context::default(), options());

        let events: Vec<_> = stream.clone().collect().await;
        assert_eq!(events.len(), 1);
        let message = stream.result().await.unwrap();
        assert_eq!(message.stop_reason, StopReason::Error);
        assert!(message.error_message.unwrap().contains("upstream exploded"));
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("data: {\"choices\":[{\"delta\":{\"content\":\"half\"}}]}\n\n"),
            )
            .mount(&server)
            .await;
        let model = gpt().with_base_url(server.uri());
        let stream = OpenAiCompatAdapter::new().stream(&model, &Context::default(), options());

        let message = stream.result().await.unwrap();
        assert_eq!(message.stop_reason, StopReason::Error);
        assert_eq!(message.text(), "half");
    }
}
