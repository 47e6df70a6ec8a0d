//! Stateful agent: keeps a conversation across loop invocations.
//!
//! [`Agent`] owns the context and configuration, starts one loop at a time,
//! and lets other tasks steer, queue follow-ups or abort while a run is in
//! flight. Share it behind an `Arc` to do that from elsewhere.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use switchyard_core::error::{AgentError, Error};
use switchyard_core::message::{AgentMessage, Message};
use switchyard_core::model::Model;
use switchyard_core::tool::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::event::AgentEvent;
use crate::loop_runner::{AgentContext, AgentHooks, AgentLoopConfig, AgentRun, agent_loop, agent_loop_continue};
use crate::queue::{MessageQueue, QueueMode};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Agent {
    config: Mutex<AgentLoopConfig>,
    context: Mutex<AgentContext>,
    steering: Arc<MessageQueue>,
    follow_up: Arc<MessageQueue>,
    active: Mutex<Option<CancellationToken>>,
    session_id: String,
}

/// Clears the active-run slot however the run ends.
///
/// Dropping the guard also cancels the run, so a caller that abandons a
/// `prompt` future does not leave a detached loop behind.
struct RunGuard<'a> {
    active: &'a Mutex<Option<CancellationToken>>,
    cancel: CancellationToken,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.cancel.cancel();
        *lock(self.active) = None;
    }
}

impl Agent {
    pub fn new(config: AgentLoopConfig, context: AgentContext) -> Self {
        Self {
            config: Mutex::new(config),
            context: Mutex::new(context),
            steering: Arc::new(MessageQueue::default()),
            follow_up: Arc::new(MessageQueue::default()),
            active: Mutex::new(None),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_queue_modes(self, steering: QueueMode, follow_up: QueueMode) -> Self {
        self.steering.set_mode(steering);
        self.follow_up.set_mode(follow_up);
        self
    }

    /// Identifier passed to providers as `session_id` unless the options set one.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> Vec<AgentMessage> {
        lock(&self.context).messages.clone()
    }

    pub fn replace_messages(&self, messages: Vec<AgentMessage>) {
        lock(&self.context).messages = messages;
    }

    pub fn set_system_prompt(&self, prompt: impl Into<String>) {
        lock(&self.context).system_prompt = Some(prompt.into());
    }

    pub fn set_tools(&self, tools: ToolRegistry) {
        lock(&self.context).tools = Arc::new(tools);
    }

    pub fn set_model(&self, model: Model) {
        lock(&self.config).model = model;
    }

    pub fn model(&self) -> Model {
        lock(&self.config).model.clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Queue a message that interrupts the current tool batch.
    pub fn steer(&self, message: impl Into<AgentMessage>) {
        self.steering.push(message.into());
    }

    /// Queue a message for when the agent would otherwise stop.
    pub fn follow_up(&self, message: impl Into<AgentMessage>) {
        self.follow_up.push(message.into());
    }

    pub fn clear_queues(&self) {
        self.steering.clear();
        self.follow_up.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.steering.pending_count() + self.follow_up.pending_count()
    }

    /// Cancel the run in flight, if any.
    pub fn abort(&self) {
        if let Some(cancel) = lock(&self.active).as_ref() {
            info!(session_id = %self.session_id, "Aborting agent run");
            cancel.cancel();
        }
    }

    /// Run the loop with new prompt messages.
    ///
    /// `on_event` sees every event in order. Returns the messages the run
    /// appended.
    pub async fn prompt(
        &self,
        messages: Vec<AgentMessage>,
        on_event: impl FnMut(&AgentEvent),
    ) -> switchyard_core::Result<Vec<AgentMessage>> {
        let (cancel, _guard) = self.begin()?;
        let run = agent_loop(messages, self.snapshot(), self.loop_config(), cancel);
        self.drive(run, on_event).await
    }

    /// Shorthand for a single user text prompt.
    pub async fn prompt_text(
        &self,
        text: impl Into<String>,
        on_event: impl FnMut(&AgentEvent),
    ) -> switchyard_core::Result<Vec<AgentMessage>> {
        self.prompt(vec![Message::user(text).into()], on_event).await
    }

    /// Run the loop from the current context, e.g. after an error.
    pub async fn continue_run(&self, on_event: impl FnMut(&AgentEvent)) -> switchyard_core::Result<Vec<AgentMessage>> {
        let (cancel, _guard) = self.begin()?;
        let run = agent_loop_continue(self.snapshot(), self.loop_config(), cancel)?;
        self.drive(run, on_event).await
    }

    fn begin(&self) -> Result<(CancellationToken, RunGuard<'_>), AgentError> {
        let mut active = lock(&self.active);
        if active.is_some() {
            return Err(AgentError::AlreadyRunning);
        }
        let cancel = CancellationToken::new();
        *active = Some(cancel.clone());
        let guard = RunGuard {
            active: &self.active,
            cancel: cancel.clone(),
        };
        Ok((cancel, guard))
    }

    fn snapshot(&self) -> AgentContext {
        lock(&self.context).clone()
    }

    fn loop_config(&self) -> AgentLoopConfig {
        let mut config = lock(&self.config).clone();
        config
            .options
            .base
            .session_id
            .get_or_insert_with(|| self.session_id.clone());
        config.hooks = Arc::new(QueuedHooks {
            inner: config.hooks,
            steering: Arc::clone(&self.steering),
            follow_up: Arc::clone(&self.follow_up),
        });
        config
    }

    async fn drive(&self, run: AgentRun, mut on_event: impl FnMut(&AgentEvent)) -> Result<Vec<AgentMessage>, Error> {
        let mut events = run.events.clone();
        while let Some(event) = events.next().await {
            on_event(&event);
        }
        let produced = run.events.result().await.unwrap_or_default();
        let context = run.join().await?;
        debug!(session_id = %self.session_id, produced = produced.len(), "Agent run stored");
        *lock(&self.context) = context;
        Ok(produced)
    }
}

/// Layers the agent's queues over the caller's hooks.
struct QueuedHooks {
    inner: Arc<dyn AgentHooks>,
    steering: Arc<MessageQueue>,
    follow_up: Arc<MessageQueue>,
}

#[async_trait]
impl AgentHooks for QueuedHooks {
    async fn transform_context(&self, messages: Vec<AgentMessage>, cancel: &CancellationToken) -> Vec<AgentMessage> {
        self.inner.transform_context(messages, cancel).await
    }

    async fn convert_to_llm(&self, messages: &[AgentMessage]) -> Vec<Message> {
        self.inner.convert_to_llm(messages).await
    }

    async fn api_key(&self, provider: &str) -> Option<String> {
        self.inner.api_key(provider).await
    }

    async fn steering_messages(&self) -> Vec<AgentMessage> {
        let mut messages = self.steering.drain();
        messages.extend(self.inner.steering_messages().await);
        messages
    }

    async fn follow_up_messages(&self) -> Vec<AgentMessage> {
        let mut messages = self.follow_up.drain();
        messages.extend(self.inner.follow_up_messages().await);
        messages
    }
}
