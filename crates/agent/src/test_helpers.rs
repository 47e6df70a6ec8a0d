//! Shared test helpers for agent loop tests.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use switchyard_core::error::ToolError;
use switchyard_core::message::{AgentMessage, AssistantMessage, ContentBlock, StopReason};
use switchyard_core::model::{Api, Model};
use switchyard_core::provider::{
    AssistantMessageEvent, AssistantMessageEventStream, Context, SimpleStreamOptions, assistant_message_stream,
};
use switchyard_core::tool::{Tool, ToolOutput, ToolUpdateCallback};
use switchyard_providers::partial::PartialMessage;
use tokio_util::sync::CancellationToken;

use crate::event::AgentEvent;
use crate::loop_runner::{AgentContext, AgentHooks, AgentRun, StreamFn};

pub fn test_model() -> Model {
    Model::new("scripted-1", Api::Custom("scripted".into()), "scripted")
}

/// One scripted model response.
pub enum Reply {
    /// Text streamed as the given deltas, then `done`.
    Text(Vec<String>),
    /// Tool calls `(id, name, arguments)`, then `done` with `toolUse`.
    ToolCalls(Vec<(String, String, serde_json::Value)>),
    /// Some text, then a terminal `error`.
    Fail(String),
    /// A bare `done` with no preceding `start`.
    DoneOnly(String),
    /// Some text and then nothing; the stream never terminates.
    Hang(String),
}

impl Reply {
    pub fn text(deltas: &[&str]) -> Self {
        Self::Text(deltas.iter().map(|d| d.to_string()).collect())
    }

    pub fn tool_calls(calls: Vec<(&str, &str, serde_json::Value)>) -> Self {
        Self::ToolCalls(
            calls
                .into_iter()
                .map(|(id, name, args)| (id.to_string(), name.to_string(), args))
                .collect(),
        )
    }

    fn play(self, model: &Model, stream: &AssistantMessageEventStream) {
        let mut partial = PartialMessage::new(model, stream.clone());
        match self {
            Self::Text(deltas) => {
                let idx = partial.start_text();
                for delta in &deltas {
                    partial.text_delta(idx, delta);
                }
                partial.finish();
            }
            Self::ToolCalls(calls) => {
                for (id, name, args) in calls {
                    let idx = partial.start_tool_call(id, name);
                    partial.tool_call_delta(idx, &args.to_string());
                    partial.end_tool_call(idx);
                }
                partial.finish();
            }
            Self::Fail(error) => {
                let idx = partial.start_text();
                partial.text_delta(idx, "partial");
                partial.fail(StopReason::Error, error);
            }
            Self::DoneOnly(text) => {
                let mut message = AssistantMessage::empty(model.api.clone(), model.provider.clone(), model.id.clone());
                message.content.push(ContentBlock::text(text));
                stream.push(AssistantMessageEvent::Done {
                    reason: StopReason::Stop,
                    message,
                });
            }
            Self::Hang(text) => {
                let idx = partial.start_text();
                partial.text_delta(idx, &text);
            }
        }
    }
}

/// A model that returns a sequence of scripted responses.
///
/// Each dispatch plays the next reply into a fresh stream. Panics if more
/// calls are made than replies provided.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    contexts: Mutex<Vec<Context>>,
    api_keys: Mutex<Vec<Option<String>>>,
    streams: Mutex<Vec<AssistantMessageEventStream>>,
    cancel_tokens: Mutex<Vec<CancellationToken>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            contexts: Mutex::new(Vec::new()),
            api_keys: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            cancel_tokens: Mutex::new(Vec::new()),
        })
    }

    pub fn stream_fn(self: &Arc<Self>) -> StreamFn {
        let this = Arc::clone(self);
        Arc::new(move |model: &Model, context: &Context, options: SimpleStreamOptions| {
            let call = this.call_count() + 1;
            let reply = this
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("ScriptedModel: no more replies (call #{call})"));
            this.contexts.lock().unwrap().push(context.clone());
            this.api_keys.lock().unwrap().push(options.base.api_key.clone());
            this.cancel_tokens.lock().unwrap().push(options.base.cancel.clone());

            let stream = assistant_message_stream();
            reply.play(model, &stream);
            this.streams.lock().unwrap().push(stream.clone());
            Ok(stream)
        })
    }

    pub fn call_count(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    pub fn contexts(&self) -> Vec<Context> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn api_keys(&self) -> Vec<Option<String>> {
        self.api_keys.lock().unwrap().clone()
    }

    pub fn streams(&self) -> Vec<AssistantMessageEventStream> {
        self.streams.lock().unwrap().clone()
    }

    /// The cancellation token each request was dispatched with.
    pub fn cancel_tokens(&self) -> Vec<CancellationToken> {
        self.cancel_tokens.lock().unwrap().clone()
    }
}

/// Hooks whose steering and follow-up polls return scripted batches in order,
/// then nothing.
#[derive(Default)]
pub struct ScriptedHooks {
    steering: Mutex<VecDeque<Vec<AgentMessage>>>,
    follow_ups: Mutex<VecDeque<Vec<AgentMessage>>>,
    api_key: Option<String>,
}

impl ScriptedHooks {
    pub fn new(steering: Vec<Vec<AgentMessage>>, follow_ups: Vec<Vec<AgentMessage>>) -> Self {
        Self {
            steering: Mutex::new(steering.into()),
            follow_ups: Mutex::new(follow_ups.into()),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }
}

#[async_trait]
impl AgentHooks for ScriptedHooks {
    async fn api_key(&self, _provider: &str) -> Option<String> {
        self.api_key.clone()
    }

    async fn steering_messages(&self) -> Vec<AgentMessage> {
        self.steering.lock().unwrap().pop_front().unwrap_or_default()
    }

    async fn follow_up_messages(&self) -> Vec<AgentMessage> {
        self.follow_ups.lock().unwrap().pop_front().unwrap_or_default()
    }
}

/// Echoes its `text` argument; reports one partial update first.
#[derive(Default)]
pub struct EchoTool {
    calls: AtomicUsize,
}

impl EchoTool {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input text"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
        on_update: Option<ToolUpdateCallback>,
    ) -> Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = arguments["text"].as_str().unwrap_or_default().to_string();
        if let Some(update) = on_update {
            update(ToolOutput::text("working"));
        }
        Ok(ToolOutput::text(text))
    }
}

/// Always fails.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _call_id: &str,
        _arguments: serde_json::Value,
        _cancel: CancellationToken,
        _on_update: Option<ToolUpdateCallback>,
    ) -> Result<ToolOutput, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "fail".into(),
            reason: "disk on fire".into(),
        })
    }
}

/// Panics instead of returning.
pub struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        "panic"
    }

    fn description(&self) -> &str {
        "Panics"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _call_id: &str,
        _arguments: serde_json::Value,
        _cancel: CancellationToken,
        _on_update: Option<ToolUpdateCallback>,
    ) -> Result<ToolOutput, ToolError> {
        panic!("tool blew up");
    }
}

/// Cancels the run it executes in, then succeeds.
pub struct CancellingTool;

#[async_trait]
impl Tool for CancellingTool {
    fn name(&self) -> &str {
        "cancel"
    }

    fn description(&self) -> &str {
        "Cancels the current run"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _call_id: &str,
        _arguments: serde_json::Value,
        cancel: CancellationToken,
        _on_update: Option<ToolUpdateCallback>,
    ) -> Result<ToolOutput, ToolError> {
        cancel.cancel();
        Ok(ToolOutput::text("cancelled"))
    }
}

/// Drain a run's events and join it.
pub async fn collect_run(run: AgentRun) -> (Vec<AgentEvent>, AgentContext) {
    let events: Vec<AgentEvent> = run.events.clone().collect().await;
    let context = run.join().await.unwrap();
    (events, context)
}

pub fn event_kinds(events: &[AgentEvent]) -> Vec<&'static str> {
    events.iter().map(AgentEvent::event_type).collect()
}
