//! Model and API identifiers.
//!
//! A [`Model`] records which vendor wire protocol ([`Api`]) it speaks and which
//! provider hosts it. Together `(provider, api, id)` identify the backend that
//! produced an assistant message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The wire protocol a model is reached through.
///
/// Known vendor APIs are enumerated so dispatch over them stays exhaustive;
/// [`Api::Custom`] covers APIs registered at runtime by extensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Api {
    AnthropicMessages,
    OpenAiCompletions,
    OpenAiResponses,
    GoogleGenerativeAi,
    Custom(String),
}

impl Api {
    /// The canonical identifier string, e.g. `"anthropic-messages"`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AnthropicMessages => "anthropic-messages",
            Self::OpenAiCompletions => "openai-completions",
            Self::OpenAiResponses => "openai-responses",
            Self::GoogleGenerativeAi => "google-generative-ai",
            Self::Custom(name) => name,
        }
    }

    /// Whether this API is one of the built-in variants.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl From<String> for Api {
    fn from(value: String) -> Self {
        match value.as_str() {
            "anthropic-messages" => Self::AnthropicMessages,
            "openai-completions" => Self::OpenAiCompletions,
            "openai-responses" => Self::OpenAiResponses,
            "google-generative-ai" => Self::GoogleGenerativeAi,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for Api {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Api> for String {
    fn from(api: Api) -> Self {
        match api {
            Api::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete model reachable through one API at one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Vendor model id (e.g., "claude-sonnet-4-20250514", "gpt-4o")
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Wire protocol used to reach the model
    pub api: Api,

    /// Hosting provider (e.g., "anthropic", "openai", "openrouter")
    pub provider: String,

    /// Base URL of the API endpoint
    #[serde(default)]
    pub base_url: String,

    /// Whether the model supports reasoning / extended thinking
    #[serde(default)]
    pub reasoning: bool,

    /// Context window in tokens
    #[serde(default = "default_context_window")]
    pub context_window: u32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_context_window() -> u32 {
    128_000
}

fn default_max_tokens() -> u32 {
    4096
}

impl Model {
    /// Create a model with default limits.
    pub fn new(id: impl Into<String>, api: Api, provider: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            api,
            provider: provider.into(),
            base_url: String::new(),
            reasoning: false,
            context_window: default_context_window(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_reasoning(mut self, reasoning: bool) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// True when `(provider, api, id)` all match.
    pub fn is_same(&self, provider: &str, api: &Api, id: &str) -> bool {
        self.provider == provider && &self.api == api && self.id == id
    }
}
