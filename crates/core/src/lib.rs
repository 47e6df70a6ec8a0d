//! # Switchyard Core
//!
//! Domain types, traits, and error definitions for the Switchyard agent kernel.
//! This crate defines the canonical model every other crate speaks:
//!
//! - [`message`]: user, assistant and tool-result messages, plus the
//!   extensible [`AgentMessage`] union
//! - [`model`]: the [`Api`] sum type and [`Model`] descriptor
//! - [`provider`]: per-call [`Context`], stream options and adapter events
//! - [`stream`]: the ordered [`EventStream`] channel with a final-result slot
//! - [`tool`] and [`schema`]: the uniform tool contract and argument validation

pub mod error;
pub mod message;
pub mod model;
pub mod provider;
pub mod schema;
pub mod stream;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, Error, ProviderError, Result, ToolError};
pub use message::{
    AgentMessage, AssistantMessage, ContentBlock, CustomMessage, Message, StopReason, ToolCall,
    ToolResultMessage, Usage, UserMessage, convert_to_llm,
};
pub use model::{Api, Model};
pub use provider::{
    AssistantMessageEvent, AssistantMessageEventStream, Context, SimpleStreamOptions,
    StreamOptions, ThinkingLevel, ToolDefinition, assistant_message_stream,
};
pub use schema::validate_arguments;
pub use stream::EventStream;
pub use tool::{Tool, ToolOutput, ToolRegistry, ToolUpdateCallback, validate_tool_call};
