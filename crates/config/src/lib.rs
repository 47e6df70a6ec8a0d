//! Configuration loading, validation, and management for Switchyard.
//!
//! Loads configuration from `~/.switchyard/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use switchyard_agent::QueueMode;
use switchyard_core::model::{Api, Model};
use switchyard_core::provider::{SimpleStreamOptions, StreamOptions, ThinkingLevel};

/// The root configuration structure.
///
/// Maps directly to `~/.switchyard/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key used when a provider has none of its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature; left to the vendor when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_temperature: Option<f32>,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Reasoning effort for models that support it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ThinkingLevel>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-sonnet-4-5".into()
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("reasoning", &self.reasoning)
            .field("providers", &self.providers)
            .field("agent", &self.agent)
            .finish()
    }
}

/// One `[providers.<name>]` table.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Wire API, e.g. `anthropic-messages` or `openai-completions`.
    /// Well-known provider names imply it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// The provider's models accept a reasoning level
    #[serde(default)]
    pub reasoning: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Extra HTTP headers sent with every request
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api", &self.api)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("reasoning", &self.reasoning)
            .field("context_window", &self.context_window)
            .field("max_tokens", &self.max_tokens)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// How queued steering messages are delivered
    #[serde(default)]
    pub steering_mode: QueueMode,

    /// How queued follow-up messages are delivered
    #[serde(default)]
    pub follow_up_mode: QueueMode,
}

/// API and base URL implied by a well-known provider name.
fn known_provider(name: &str) -> Option<(Api, &'static str)> {
    match name {
        "anthropic" => Some((Api::AnthropicMessages, "https://api.anthropic.com")),
        "openai" => Some((Api::OpenAiCompletions, "https://api.openai.com/v1")),
        "openrouter" => Some((Api::OpenAiCompletions, "https://openrouter.ai/api/v1")),
        "groq" => Some((Api::OpenAiCompletions, "https://api.groq.com/openai/v1")),
        "deepseek" => Some((Api::OpenAiCompletions, "https://api.deepseek.com/v1")),
        "ollama" => Some((Api::OpenAiCompletions, "http://localhost:11434/v1")),
        _ => None,
    }
}

/// APIs with a built-in adapter.
fn is_supported_api(api: &Api) -> bool {
    matches!(api, Api::AnthropicMessages | Api::OpenAiCompletions)
}

/// Vendor-specific key variables, checked after the provider's own table.
const VENDOR_KEY_VARS: [(&str, &str); 2] = [("anthropic", "ANTHROPIC_API_KEY"), ("openai", "OPENAI_API_KEY")];

impl AppConfig {
    /// Load configuration from the default location, then apply
    /// environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&Self::config_path())
    }

    /// Like [`AppConfig::load`], reading `path` instead of the default file.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// `SWITCHYARD_PROVIDER` and `SWITCHYARD_MODEL` replace the defaults;
    /// key variables only fill gaps.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("SWITCHYARD_API_KEY");
        }

        if let Some(provider) = lookup("SWITCHYARD_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("SWITCHYARD_MODEL") {
            self.default_model = model;
        }

        for (provider, var) in VENDOR_KEY_VARS {
            if let Some(key) = lookup(var) {
                let entry = self.providers.entry(provider.to_string()).or_default();
                if entry.api_key.is_none() {
                    entry.api_key = Some(key);
                }
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchyard")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(temperature) = self.default_temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::ValidationError(
                    "default_temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.default_max_tokens == 0 {
            return Err(ConfigError::ValidationError("default_max_tokens must be > 0".into()));
        }

        for (name, provider) in &self.providers {
            if let Some(api) = &provider.api {
                if !is_supported_api(&Api::from(api.as_str())) {
                    return Err(ConfigError::ValidationError(format!(
                        "provider '{name}' uses unsupported api '{api}'"
                    )));
                }
            } else if known_provider(name).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{name}' must set `api`"
                )));
            }
        }

        Ok(())
    }

    /// Resolve credentials for `provider`: its own table first, then the
    /// global key.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Check if an API key is available for the default provider.
    pub fn has_api_key(&self) -> bool {
        self.api_key_for(&self.default_provider).is_some()
    }

    /// Build the default [`Model`] from the provider table.
    pub fn resolve_model(&self) -> Result<Model, ConfigError> {
        let name = self.default_provider.as_str();
        let entry = self.providers.get(name);
        let known = known_provider(name);

        let api = match entry.and_then(|p| p.api.as_deref()) {
            Some(api) => Api::from(api),
            None => known
                .as_ref()
                .map(|(api, _)| api.clone())
                .ok_or_else(|| ConfigError::ValidationError(format!("provider '{name}' must set `api`")))?,
        };

        let base_url = entry
            .and_then(|p| p.base_url.clone())
            .or_else(|| known.map(|(_, url)| url.to_string()))
            .unwrap_or_default();

        let mut model = Model::new(&self.default_model, api, name)
            .with_base_url(base_url)
            .with_max_tokens(entry.and_then(|p| p.max_tokens).unwrap_or(self.default_max_tokens));

        if let Some(entry) = entry {
            model = model.with_reasoning(entry.reasoning);
            if let Some(window) = entry.context_window {
                model.context_window = window;
            }
        }
        Ok(model)
    }

    /// Stream options for the default provider.
    ///
    /// `max_tokens` follows the same precedence as [`AppConfig::resolve_model`]:
    /// the provider table first, then `default_max_tokens`.
    pub fn stream_options(&self) -> SimpleStreamOptions {
        let entry = self.providers.get(&self.default_provider);
        let headers = entry.map(|p| p.headers.clone()).unwrap_or_default();
        SimpleStreamOptions {
            base: StreamOptions {
                api_key: self.api_key_for(&self.default_provider),
                temperature: self.default_temperature,
                max_tokens: Some(entry.and_then(|p| p.max_tokens).unwrap_or(self.default_max_tokens)),
                headers,
                ..StreamOptions::default()
            },
            reasoning: self.reasoning,
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: None,
            default_max_tokens: default_max_tokens(),
            reasoning: None,
            providers: HashMap::new(),
            agent: AgentSettings::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use switchyard_core::provider::Context;
    use switchyard_providers::OpenAiCompatAdapter;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "anthropic");
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.steering_mode, QueueMode::OneAtATime);
    }

    #[test]
    fn config_roundtrip_toml() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "local".into(),
            ProviderConfig {
                api: Some("openai-completions".into()),
                base_url: Some("http://localhost:8080/v1".into()),
                ..ProviderConfig::default()
            },
        );
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.providers["local"].base_url.as_deref(), Some("http://localhost:8080/v1"));
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: Some(5.0),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_without_api_rejected() {
        let mut config = AppConfig::default();
        config.providers.insert("mystery".into(), ProviderConfig::default());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mystery"));

        config.providers.get_mut("mystery").unwrap().api = Some("google-generative-ai".into());
        assert!(config.validate().unwrap_err().to_string().contains("unsupported api"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.default_provider, "anthropic");
    }

    #[test]
    fn load_from_file_parses_agent_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_provider = "openrouter"
default_model = "anthropic/claude-sonnet-4"
reasoning = "high"

[providers.openrouter]
api_key = "sk-or-test"
reasoning = true

[agent]
system_prompt = "You are terse."
steering_mode = "all"
follow_up_mode = "one-at-a-time"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.reasoning, Some(ThinkingLevel::High));
        assert_eq!(config.agent.steering_mode, QueueMode::All);
        assert_eq!(config.agent.follow_up_mode, QueueMode::OneAtATime);
        assert_eq!(config.agent.system_prompt.as_deref(), Some("You are terse."));

        let model = config.resolve_model().unwrap();
        assert_eq!(model.api, Api::OpenAiCompletions);
        assert_eq!(model.base_url, "https://openrouter.ai/api/v1");
        assert!(model.reasoning);
        assert_eq!(config.stream_options().base.api_key.as_deref(), Some("sk-or-test"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_max_tokens = \"lots\"").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_defaults_and_fills_keys() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("from-file".into()),
                ..ProviderConfig::default()
            },
        );
        config.apply_env(env(&[
            ("SWITCHYARD_PROVIDER", "openai"),
            ("SWITCHYARD_MODEL", "gpt-4o"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("OPENAI_API_KEY", "sk-env"),
        ]));

        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.api_key_for("anthropic").as_deref(), Some("sk-ant"));
        // File keys win over vendor variables.
        assert_eq!(config.api_key_for("openai").as_deref(), Some("from-file"));
    }

    #[test]
    fn global_key_is_the_fallback() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("SWITCHYARD_API_KEY", "sk-global")]));
        assert_eq!(config.api_key_for("groq").as_deref(), Some("sk-global"));
        assert!(config.has_api_key());
    }

    #[test]
    fn resolve_model_for_custom_provider() {
        let mut config = AppConfig {
            default_provider: "local".into(),
            default_model: "qwen2.5-coder".into(),
            ..AppConfig::default()
        };
        config.providers.insert(
            "local".into(),
            ProviderConfig {
                api: Some("openai-completions".into()),
                base_url: Some("http://127.0.0.1:8000/v1/".into()),
                max_tokens: Some(2048),
                context_window: Some(32_000),
                ..ProviderConfig::default()
            },
        );

        let model = config.resolve_model().unwrap();
        assert_eq!(model.provider, "local");
        assert_eq!(model.base_url, "http://127.0.0.1:8000/v1");
        assert_eq!(model.max_tokens, 2048);
        assert_eq!(model.context_window, 32_000);

        // The provider limit reaches the request, not just the model.
        let options = config.stream_options();
        assert_eq!(options.base.max_tokens, Some(2048));
        let body = OpenAiCompatAdapter::build_request_body(&model, &Context::default(), &options.base, None);
        assert_eq!(body["max_tokens"], 2048);
    }

    #[test]
    fn stream_options_fall_back_to_default_max_tokens() {
        let config = AppConfig {
            default_max_tokens: 1000,
            ..AppConfig::default()
        };
        assert_eq!(config.stream_options().base.max_tokens, Some(1000));
    }

    #[test]
    fn debug_redacts_keys() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-other".into()),
                ..ProviderConfig::default()
            },
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("sk-other"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("anthropic"));
        assert!(toml_str.contains("one-at-a-time"));
    }
}
