//! Steering and follow-up queues.
//!
//! Messages queued while a run is in flight are handed to the loop through
//! its hooks: steering messages interrupt the current tool batch, follow-ups
//! are only picked up once the agent would otherwise stop.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use switchyard_core::message::AgentMessage;

/// How many queued messages a single poll hands out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueMode {
    /// Deliver everything queued at once.
    All,
    /// Deliver the oldest message; the rest wait for later polls.
    #[default]
    OneAtATime,
}

#[derive(Debug, Default)]
struct QueueState {
    mode: QueueMode,
    messages: VecDeque<AgentMessage>,
}

/// A FIFO of pending messages shared between a caller and a running loop.
#[derive(Debug, Default)]
pub struct MessageQueue {
    state: Mutex<QueueState>,
}

impl MessageQueue {
    pub fn new(mode: QueueMode) -> Self {
        Self {
            state: Mutex::new(QueueState {
                mode,
                messages: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode(&self) -> QueueMode {
        self.lock().mode
    }

    pub fn set_mode(&self, mode: QueueMode) {
        self.lock().mode = mode;
    }

    pub fn push(&self, message: AgentMessage) {
        self.lock().messages.push_back(message);
    }

    /// Take the messages due for delivery under the current mode.
    pub fn drain(&self) -> Vec<AgentMessage> {
        let mut state = self.lock();
        match state.mode {
            QueueMode::All => state.messages.drain(..).collect(),
            QueueMode::OneAtATime => state.messages.pop_front().into_iter().collect(),
        }
    }

    pub fn clear(&self) {
        self.lock().messages.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.lock().messages.len()
    }
}
