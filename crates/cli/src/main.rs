//! Switchyard CLI — the main entry point.
//!
//! Commands:
//! - `apis`    — List the registered model APIs
//! - `chat`    — Run the agent loop and print its events as JSON lines
//! - `config`  — Validate or initialize the configuration file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard — cross-vendor LLM agent orchestration kernel",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read configuration from this file instead of ~/.switchyard/config.toml
    #[arg(long, global = true, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered model APIs
    Apis,

    /// Chat with the agent; events are printed to stdout as JSON lines
    Chat {
        /// Send a single message instead of reading prompts from stdin
        #[arg(short, long)]
        message: Option<String>,

        /// Override the configured model id
        #[arg(long)]
        model: Option<String>,

        /// Override the configured provider
        #[arg(long)]
        provider: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate the configuration
    Validate,

    /// Write a default configuration file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Apis => commands::apis::run()?,
        Commands::Chat {
            message,
            model,
            provider,
        } => {
            let overrides = commands::chat::Overrides { model, provider };
            commands::chat::run(cli.config.as_deref(), message, overrides).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate(cli.config.as_deref())?,
            ConfigAction::Init => commands::config_cmd::init(cli.config.as_deref())?,
        },
    }

    Ok(())
}
