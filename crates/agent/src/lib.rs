//! The Switchyard agent loop.
//!
//! The agent follows a **Prompt → Stream → Act → Steer** cycle:
//!
//! 1. **Receive** prompt messages (or continue from the existing context)
//! 2. **Stream** an assistant response through the provider registry
//! 3. **If tool calls**: execute them in order, append results, loop back to step 2
//! 4. **If steering arrives** mid-batch: skip the remaining calls and inject it
//! 5. **When idle**: pick up follow-up messages or finish
//!
//! Every step is published as an [`AgentEvent`] on the run's
//! [`AgentEventStream`].

pub mod agent;
pub mod event;
pub mod loop_runner;
pub mod messages;
pub mod queue;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::Agent;
pub use event::{AgentEvent, AgentEventStream, agent_event_stream};
pub use loop_runner::{
    AgentContext, AgentHooks, AgentLoop, AgentLoopConfig, AgentRun, NoHooks, SKIPPED_TOOL_TEXT, StreamFn, agent_loop,
    agent_loop_continue,
};
pub use messages::BashExecutionMessage;
pub use queue::{MessageQueue, QueueMode};
