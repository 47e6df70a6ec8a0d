//! LLM provider plumbing for Switchyard.
//!
//! - [`registry`]: routes a call to the adapter registered for `model.api`
//! - [`transform`]: makes a conversation recorded against one model
//!   replayable against another
//! - [`anthropic`] / [`openai_compat`]: the built-in streaming adapters
//! - [`sse`] / [`partial`]: shared streaming helpers used by the adapters

pub mod anthropic;
pub mod openai_compat;
pub mod partial;
pub mod registry;
pub mod sse;
pub mod transform;

pub use anthropic::AnthropicAdapter;
pub use openai_compat::OpenAiCompatAdapter;
pub use registry::{
    ApiAdapter, ApiProvider, ApiRegistry, clear_api_providers, complete, complete_simple, get_api_provider,
    get_api_providers, register_api_provider, reset_api_providers, stream, stream_simple,
    unregister_api_providers,
};
pub use transform::{
    IdNormalizer, normalize_anthropic_tool_call_id, normalize_openai_tool_call_id, transform_messages,
};
