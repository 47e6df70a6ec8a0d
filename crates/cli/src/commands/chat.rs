//! `switchyard chat` — Drive the agent loop from the terminal.
//!
//! Every agent event is written to stdout as one JSON line. Prompts come
//! from `--message` or, without it, one per line of stdin. Ctrl-C aborts
//! the run in flight.

use std::path::Path;
use std::sync::Arc;

use switchyard_agent::{Agent, AgentContext, AgentEvent, AgentLoopConfig};
use switchyard_config::{AppConfig, ConfigError};
use switchyard_core::message::{AgentMessage, StopReason};
use switchyard_core::tool::ToolRegistry;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Command-line replacements for the configured defaults.
#[derive(Debug, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub provider: Option<String>,
}

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
    overrides: Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(provider) = overrides.provider {
        config.default_provider = provider;
    }
    if let Some(model) = overrides.model {
        config.default_model = model;
    }

    // Check for an API key early so the error is clear.
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{}'!", config.default_provider);
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    ANTHROPIC_API_KEY   (for anthropic)");
        eprintln!("    OPENAI_API_KEY      (for openai)");
        eprintln!("    SWITCHYARD_API_KEY  (any provider)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let agent = Arc::new(build_agent(&config)?);
    info!(
        provider = %config.default_provider,
        model = %config.default_model,
        session_id = %agent.session_id(),
        "Starting chat"
    );

    let abort_handle = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                agent.abort();
            }
        })
    };

    let outcome = match message {
        Some(text) => prompt_once(&agent, text).await,
        None => prompt_lines(&agent).await,
    };
    abort_handle.abort();
    outcome
}

/// Load from `path`, or the default location when unset.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_at(path),
        None => AppConfig::load(),
    }
}

fn build_agent(config: &AppConfig) -> Result<Agent, ConfigError> {
    let model = config.resolve_model()?;
    let loop_config = AgentLoopConfig::new(model).with_options(config.stream_options());

    let mut context = AgentContext::new().with_tools(ToolRegistry::new());
    if let Some(prompt) = &config.agent.system_prompt {
        context = context.with_system_prompt(prompt.clone());
    }

    Ok(Agent::new(loop_config, context).with_queue_modes(config.agent.steering_mode, config.agent.follow_up_mode))
}

async fn prompt_lines(agent: &Agent) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = prompt_once(agent, line.to_string()).await {
            // A failed turn does not end the session.
            warn!(error = %e, "Prompt failed");
        }
    }
    Ok(())
}

async fn prompt_once(agent: &Agent, text: String) -> Result<(), Box<dyn std::error::Error>> {
    let produced = agent.prompt_text(text, print_event).await?;
    match last_failure(&produced) {
        Some(reason) => Err(reason.into()),
        None => Ok(()),
    }
}

fn print_event(event: &AgentEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(event = event.event_type(), error = %e, "Failed to serialize event"),
    }
}

/// The error text of the final assistant message, if the run ended badly.
fn last_failure(messages: &[AgentMessage]) -> Option<String> {
    let last = messages.iter().rev().find_map(AgentMessage::as_assistant)?;
    match last.stop_reason {
        StopReason::Error => Some(
            last.error_message
                .clone()
                .unwrap_or_else(|| "Model request failed".to_string()),
        ),
        StopReason::Aborted => Some("Request was aborted".to_string()),
        _ => None,
    }
}
