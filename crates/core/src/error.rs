//! Error types for the Switchyard kernel.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Agent loop errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("No API provider registered for api: {0}")]
    ApiNotRegistered(String),

    #[error("Mismatched api: model declares '{requested}' but adapter is registered for '{registered}'")]
    ApiMismatch { registered: String, requested: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool {0} not found")]
    NotFound(String),

    #[error("Validation failed for tool \"{tool_name}\": {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool {tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool execution aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Cannot continue: no messages in context")]
    EmptyContext,

    #[error("Cannot continue from message role: {0}")]
    CannotContinueFrom(String),

    #[error("Agent is already processing a prompt")]
    AlreadyRunning,
}
