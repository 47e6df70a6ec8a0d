//! The agent loop: drives model turns and tool execution for one invocation.
//!
//! A run follows a **Prompt → Stream → Act → Steer** cycle:
//!
//! 1. Emit `agent_start`, `turn_start` and a start/end pair per prompt
//! 2. Build the model context (`transform_context` → `convert_to_llm`),
//!    resolve the API key and dispatch through the registry
//! 3. Mirror the adapter stream as `message_start` / `message_update` /
//!    `message_end`; the adapter's final result replaces the provisional message
//! 4. An `error` or `aborted` stop reason ends the run immediately
//! 5. Execute requested tools one at a time, then emit `turn_end`
//! 6. Steering messages queued while tools ran are injected before the next
//!    model call and cause any remaining calls of the batch to be skipped
//! 7. When the model stops asking for tools and nothing is pending, poll
//!    follow-ups; if there are any, start another round
//! 8. Emit `agent_end` with every produced message and close the channel
//!
//! The [`CancellationToken`] is checked before each model call, raced against
//! every stream pull and checked before each tool.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::{FutureExt, StreamExt};
use switchyard_core::error::{AgentError, Error, ProviderError, ToolError};
use switchyard_core::message::{self, AgentMessage, AssistantMessage, Message, StopReason, ToolCall, ToolResultMessage};
use switchyard_core::model::Model;
use switchyard_core::provider::{AssistantMessageEvent, AssistantMessageEventStream, Context, SimpleStreamOptions};
use switchyard_core::tool::{ToolOutput, ToolRegistry, ToolUpdateCallback, validate_tool_call};
use switchyard_providers::registry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{AgentEvent, AgentEventStream, agent_event_stream};

/// Result text for tool calls dropped because the user steered the agent.
pub const SKIPPED_TOOL_TEXT: &str = "Skipped due to queued user message.";

const ABORTED_TEXT: &str = "Request was aborted";

/// Replaces registry dispatch for a loop (custom transports, scripted tests).
pub type StreamFn = Arc<
    dyn Fn(&Model, &Context, SimpleStreamOptions) -> Result<AssistantMessageEventStream, ProviderError> + Send + Sync,
>;

/// Caller-supplied behavior consulted by the loop at fixed points.
#[async_trait]
pub trait AgentHooks: Send + Sync {
    /// Rewrite the agent-level context before each model call (pruning,
    /// injecting external context).
    async fn transform_context(&self, messages: Vec<AgentMessage>, _cancel: &CancellationToken) -> Vec<AgentMessage> {
        messages
    }

    /// Reduce agent messages to what the model sees.
    async fn convert_to_llm(&self, messages: &[AgentMessage]) -> Vec<Message> {
        message::convert_to_llm(messages)
    }

    /// Resolve a key per call, for short-lived credentials.
    /// `None` falls back to `options.api_key`.
    async fn api_key(&self, _provider: &str) -> Option<String> {
        None
    }

    /// Messages that should interrupt the current tool batch.
    async fn steering_messages(&self) -> Vec<AgentMessage> {
        Vec::new()
    }

    /// Messages to process once the agent would otherwise stop.
    async fn follow_up_messages(&self) -> Vec<AgentMessage> {
        Vec::new()
    }
}

/// Hooks that keep every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl AgentHooks for NoHooks {}

/// Per-run configuration.
#[derive(Clone)]
pub struct AgentLoopConfig {
    pub model: Model,
    pub options: SimpleStreamOptions,
    pub hooks: Arc<dyn AgentHooks>,
    pub stream_fn: Option<StreamFn>,
}

impl AgentLoopConfig {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            options: SimpleStreamOptions::default(),
            hooks: Arc::new(NoHooks),
            stream_fn: None,
        }
    }

    pub fn with_options(mut self, options: SimpleStreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn AgentHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_stream_fn(mut self, stream_fn: StreamFn) -> Self {
        self.stream_fn = Some(stream_fn);
        self
    }
}

impl std::fmt::Debug for AgentLoopConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoopConfig")
            .field("model", &self.model)
            .field("options", &self.options)
            .field("stream_fn", &self.stream_fn.is_some())
            .finish()
    }
}

/// Conversation state a loop runs against.
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub system_prompt: Option<String>,
    pub messages: Vec<AgentMessage>,
    pub tools: Arc<ToolRegistry>,
}

impl AgentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<AgentMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }
}

/// Drives a single loop invocation.
///
/// Owns the context, the produced-message buffer and the event channel for
/// the duration of the run; the context is handed back when the run ends.
pub struct AgentLoop {
    context: AgentContext,
    config: AgentLoopConfig,
    cancel: CancellationToken,
    events: AgentEventStream,
    new_messages: Vec<AgentMessage>,
    turn: usize,
}

impl AgentLoop {
    pub fn new(context: AgentContext, config: AgentLoopConfig, cancel: CancellationToken) -> Self {
        Self {
            context,
            config,
            cancel,
            events: agent_event_stream(),
            new_messages: Vec::new(),
            turn: 0,
        }
    }

    /// Consumer handle for this run's events.
    pub fn events(&self) -> AgentEventStream {
        self.events.clone()
    }

    /// Append `prompts` and run until the agent stops.
    pub async fn run(mut self, prompts: Vec<AgentMessage>) -> AgentContext {
        self.emit(AgentEvent::AgentStart);
        self.emit(AgentEvent::TurnStart);
        for prompt in prompts {
            self.append(prompt);
        }
        self.run_turns().await;
        std::mem::take(&mut self.context)
    }

    /// Continue from the existing context without adding a prompt.
    ///
    /// The trailing message must be something a model can answer (a user
    /// message or tool result).
    pub async fn resume(self) -> Result<AgentContext, AgentError> {
        if let Err(e) = check_continuable(&self.context) {
            self.events.close(None);
            return Err(e);
        }
        Ok(self.resume_unchecked().await)
    }

    async fn resume_unchecked(mut self) -> AgentContext {
        self.emit(AgentEvent::AgentStart);
        self.emit(AgentEvent::TurnStart);
        self.run_turns().await;
        std::mem::take(&mut self.context)
    }

    fn emit(&self, event: AgentEvent) {
        self.events.push(event);
    }

    /// Append a complete message with a back-to-back start/end pair.
    fn append(&mut self, message: AgentMessage) {
        self.emit(AgentEvent::MessageStart {
            message: message.clone(),
        });
        self.context.messages.push(message.clone());
        self.new_messages.push(message.clone());
        self.emit(AgentEvent::MessageEnd { message });
    }

    async fn run_turns(&mut self) {
        let hooks = Arc::clone(&self.config.hooks);
        let mut first_turn = true;
        let mut pending = hooks.steering_messages().await;

        loop {
            let mut has_tool_calls = true;

            while has_tool_calls || !pending.is_empty() {
                if first_turn {
                    first_turn = false;
                } else {
                    self.emit(AgentEvent::TurnStart);
                }
                self.turn += 1;

                for message in pending.drain(..) {
                    self.append(message);
                }

                let message = self.stream_assistant_response().await;
                if message.stop_reason.is_failure() {
                    debug!(
                        turn = self.turn,
                        stop_reason = ?message.stop_reason,
                        "Turn ended without completing"
                    );
                    self.emit(AgentEvent::TurnEnd {
                        message: message.into(),
                        tool_results: Vec::new(),
                    });
                    self.finish();
                    return;
                }

                has_tool_calls = !message.tool_calls().is_empty();
                let mut tool_results = Vec::new();
                let mut steering = Vec::new();
                if has_tool_calls {
                    (tool_results, steering) = self.execute_tool_calls(&message).await;
                }

                debug!(turn = self.turn, tool_results = tool_results.len(), "Turn complete");
                self.emit(AgentEvent::TurnEnd {
                    message: message.into(),
                    tool_results,
                });

                pending = if steering.is_empty() {
                    hooks.steering_messages().await
                } else {
                    steering
                };
            }

            let follow_ups = hooks.follow_up_messages().await;
            if follow_ups.is_empty() {
                break;
            }
            debug!(count = follow_ups.len(), "Processing follow-up messages");
            pending = follow_ups;
        }

        self.finish();
    }

    fn finish(&mut self) {
        let messages = std::mem::take(&mut self.new_messages);
        debug!(turns = self.turn, messages = messages.len(), "Agent run finished");
        self.emit(AgentEvent::AgentEnd {
            messages: messages.clone(),
        });
        self.events.close(Some(messages));
    }

    async fn stream_assistant_response(&mut self) -> AssistantMessage {
        if self.cancel.is_cancelled() {
            let message = self.failed_message(None, StopReason::Aborted, ABORTED_TEXT);
            return self.conclude(message, false);
        }

        let hooks = Arc::clone(&self.config.hooks);
        let messages = hooks.transform_context(self.context.messages.clone(), &self.cancel).await;
        let llm_context = Context {
            system_prompt: self.context.system_prompt.clone(),
            messages: hooks.convert_to_llm(&messages).await,
            tools: self.context.tools.definitions(),
        };

        let mut options = self.config.options.clone();
        options.base.cancel = self.cancel.clone();
        if let Some(key) = hooks.api_key(&self.config.model.provider).await {
            options.base.api_key = Some(key);
        }

        let model = &self.config.model;
        debug!(
            turn = self.turn,
            provider = %model.provider,
            model = %model.id,
            messages = llm_context.messages.len(),
            tools = llm_context.tools.len(),
            "Requesting assistant response"
        );

        let dispatched = match &self.config.stream_fn {
            Some(stream_fn) => stream_fn(model, &llm_context, options),
            None => registry::stream_simple(model, &llm_context, options),
        };

        match dispatched {
            Ok(stream) => self.consume(stream).await,
            Err(e) => {
                warn!(error = %e, "Model dispatch failed");
                let message = self.failed_message(None, StopReason::Error, e.to_string());
                self.conclude(message, false)
            }
        }
    }

    /// Mirror an adapter stream into the context and the event channel.
    async fn consume(&mut self, mut stream: AssistantMessageEventStream) -> AssistantMessage {
        let cancel = self.cancel.clone();
        let mut partial: Option<AssistantMessage> = None;

        loop {
            let next = tokio::select! {
                biased;
                event = stream.next() => event,
                _ = cancel.cancelled() => {
                    debug!(turn = self.turn, "Model stream cancelled");
                    let started = partial.is_some();
                    let message = self.failed_message(partial, StopReason::Aborted, ABORTED_TEXT);
                    return self.conclude(message, started);
                }
            };

            let Some(event) = next else {
                let started = partial.is_some();
                let message = match stream.result().await {
                    Some(message) => message,
                    None => {
                        warn!(turn = self.turn, "Model stream closed without a final message");
                        self.failed_message(partial, StopReason::Error, "Model stream closed without a final message")
                    }
                };
                return self.conclude(message, started);
            };

            match &event {
                AssistantMessageEvent::Done { message, .. } | AssistantMessageEvent::Error { error: message, .. } => {
                    let final_message = stream.result().await.unwrap_or_else(|| message.clone());
                    if final_message.stop_reason.is_failure() {
                        warn!(
                            stop_reason = ?final_message.stop_reason,
                            error = final_message.error_message.as_deref().unwrap_or_default(),
                            "Model stream failed"
                        );
                    }
                    return self.conclude(final_message, partial.is_some());
                }
                other => {
                    let Some(snapshot) = other.partial() else {
                        continue;
                    };
                    let message = AgentMessage::from(snapshot.clone());
                    let first = partial.is_none();
                    partial = Some(snapshot.clone());

                    if first {
                        self.context.messages.push(message.clone());
                        self.emit(AgentEvent::MessageStart {
                            message: message.clone(),
                        });
                        if matches!(other, AssistantMessageEvent::Start { .. }) {
                            continue;
                        }
                    } else if let Some(last) = self.context.messages.last_mut() {
                        *last = message.clone();
                    }

                    self.emit(AgentEvent::MessageUpdate {
                        message,
                        assistant_message_event: event.clone(),
                    });
                }
            }
        }
    }

    /// Record the final assistant message and emit `message_end`.
    ///
    /// `started` means a provisional message is already the last entry of
    /// the context and `message_start` went out for it.
    fn conclude(&mut self, message: AssistantMessage, started: bool) -> AssistantMessage {
        let agent_message = AgentMessage::from(message.clone());
        if started {
            if let Some(last) = self.context.messages.last_mut() {
                *last = agent_message.clone();
            }
        } else {
            self.context.messages.push(agent_message.clone());
            self.emit(AgentEvent::MessageStart {
                message: agent_message.clone(),
            });
        }
        self.new_messages.push(agent_message.clone());
        self.emit(AgentEvent::MessageEnd { message: agent_message });
        message
    }

    fn failed_message(
        &self,
        base: Option<AssistantMessage>,
        reason: StopReason,
        error: impl Into<String>,
    ) -> AssistantMessage {
        let model = &self.config.model;
        let mut message =
            base.unwrap_or_else(|| AssistantMessage::empty(model.api.clone(), model.provider.clone(), model.id.clone()));
        message.stop_reason = reason;
        message.error_message = Some(error.into());
        message
    }

    /// Run every tool call of `message` in order.
    ///
    /// Returns the results plus any steering messages that interrupted the
    /// batch.
    async fn execute_tool_calls(&mut self, message: &AssistantMessage) -> (Vec<ToolResultMessage>, Vec<AgentMessage>) {
        let calls: Vec<ToolCall> = message.tool_calls().into_iter().cloned().collect();
        let hooks = Arc::clone(&self.config.hooks);
        let mut results = Vec::with_capacity(calls.len());

        for (index, call) in calls.iter().enumerate() {
            self.emit(AgentEvent::ToolExecutionStart {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                args: call.arguments.clone(),
            });
            let output = self.execute_tool_call(call).await;
            results.push(self.record_tool_result(call, output));

            let steering = hooks.steering_messages().await;
            if !steering.is_empty() {
                let remaining = &calls[index + 1..];
                if !remaining.is_empty() {
                    debug!(skipped = remaining.len(), "Steering message queued, skipping remaining tool calls");
                }
                for skipped in remaining {
                    self.emit(AgentEvent::ToolExecutionStart {
                        tool_call_id: skipped.id.clone(),
                        tool_name: skipped.name.clone(),
                        args: skipped.arguments.clone(),
                    });
                    results.push(self.record_tool_result(skipped, ToolOutput::error(SKIPPED_TOOL_TEXT)));
                }
                return (results, steering);
            }
        }

        (results, Vec::new())
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> ToolOutput {
        if self.cancel.is_cancelled() {
            return ToolOutput::error(ToolError::Aborted(call.name.clone()).to_string());
        }

        let Some(tool) = self.context.tools.get(&call.name) else {
            warn!(tool = %call.name, "Tool not found");
            return ToolOutput::error(ToolError::NotFound(call.name.clone()).to_string());
        };

        let arguments = match validate_tool_call(tool.as_ref(), call) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool arguments rejected");
                return ToolOutput::error(e.to_string());
            }
        };

        let on_update: ToolUpdateCallback = {
            let events = self.events.clone();
            let tool_call_id = call.id.clone();
            let tool_name = call.name.clone();
            let args = call.arguments.clone();
            Arc::new(move |partial_result| {
                events.push(AgentEvent::ToolExecutionUpdate {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    args: args.clone(),
                    partial_result,
                });
            })
        };

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        let execution = AssertUnwindSafe(tool.execute(&call.id, arguments, self.cancel.clone(), Some(on_update)));
        match execution.catch_unwind().await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolOutput::error(e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(tool = %call.name, reason = %reason, "Tool panicked");
                let error = ToolError::ExecutionFailed {
                    tool_name: call.name.clone(),
                    reason: format!("panicked: {reason}"),
                };
                ToolOutput::error(error.to_string())
            }
        }
    }

    /// Emit `tool_execution_end` and append the tool-result message.
    fn record_tool_result(&mut self, call: &ToolCall, output: ToolOutput) -> ToolResultMessage {
        let is_error = output.is_error;
        self.emit(AgentEvent::ToolExecutionEnd {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result: output.clone(),
            is_error,
        });

        let result = ToolResultMessage {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: output.content,
            details: output.details,
            is_error,
            timestamp: Utc::now(),
        };
        self.append(result.clone().into());
        result
    }
}

impl Drop for AgentLoop {
    /// A run that unwinds or is dropped mid-flight still ends its channel.
    fn drop(&mut self) {
        if self.events.is_done() {
            return;
        }
        warn!(turn = self.turn, "Agent run ended abnormally");
        let messages = std::mem::take(&mut self.new_messages);
        self.emit(AgentEvent::AgentEnd {
            messages: messages.clone(),
        });
        self.events.close(Some(messages));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn check_continuable(context: &AgentContext) -> Result<(), AgentError> {
    match context.messages.last() {
        None => Err(AgentError::EmptyContext),
        Some(last) if last.as_assistant().is_some() => Err(AgentError::CannotContinueFrom(last.role().to_string())),
        Some(_) => Ok(()),
    }
}

/// A spawned loop invocation.
pub struct AgentRun {
    /// Events of this run; completes after `agent_end`.
    pub events: AgentEventStream,
    handle: JoinHandle<AgentContext>,
}

impl AgentRun {
    /// Wait for the run to finish and take back the context.
    pub async fn join(self) -> switchyard_core::Result<AgentContext> {
        self.handle
            .await
            .map_err(|e| Error::Internal(format!("agent loop task failed: {e}")))
    }
}

/// Start a run with new prompt messages.
pub fn agent_loop(
    prompts: Vec<AgentMessage>,
    context: AgentContext,
    config: AgentLoopConfig,
    cancel: CancellationToken,
) -> AgentRun {
    let runner = AgentLoop::new(context, config, cancel);
    let events = runner.events();
    let handle = tokio::spawn(runner.run(prompts));
    AgentRun { events, handle }
}

/// Start a run from the existing context, e.g. to retry after an error.
pub fn agent_loop_continue(
    context: AgentContext,
    config: AgentLoopConfig,
    cancel: CancellationToken,
) -> Result<AgentRun, AgentError> {
    check_continuable(&context)?;
    let runner = AgentLoop::new(context, config, cancel);
    let events = runner.events();
    let handle = tokio::spawn(runner.resume_unchecked());
    Ok(AgentRun { events, handle })
}
