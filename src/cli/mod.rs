//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod chat;
pub mod config;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use dst_ai_gateway::config::{AiConfig, LoggingConfig};
use dst_ai_gateway::providers::ChatOptions;
use dst_ai_gateway::AiError;

#[derive(Parser)]
#[command(name = "dst-ai")]
#[command(version)]
#[command(about = "Query the DST management AI gateway", long_about = None)]
struct Cli {
    /// Config file (default: ~/.dst-ai/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and print the whole answer
    Chat(PromptArgs),
    /// Ask one question and print the answer as it arrives
    Stream(PromptArgs),
    /// Validate the configuration and print the effective values
    CheckConfig,
}

#[derive(Args, Debug)]
pub(crate) struct PromptArgs {
    /// The question to send
    prompt: String,
    /// System prompt
    #[arg(long, default_value = "")]
    system: String,
    /// Override the configured model
    #[arg(long)]
    model: Option<String>,
    /// Override the configured sampling temperature
    #[arg(long)]
    temperature: Option<f32>,
    /// Override the configured response token cap
    #[arg(long)]
    max_tokens: Option<u32>,
}

impl PromptArgs {
    fn options(&self) -> ChatOptions {
        ChatOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Print the end-user message for `err` and hand the detailed error back.
pub(crate) fn report(err: AiError) -> anyhow::Error {
    eprintln!("{}", err.user_message());
    anyhow::Error::new(err)
}

/// Run the CLI.
pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load config early so logging follows it; a broken config still gets
    // default logging and is reported by the command itself.
    let loaded = match &cli.config {
        Some(path) => AiConfig::load_from_path(path),
        None => AiConfig::load(),
    };
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_else(|_| LoggingConfig::default());
    if let Err(e) = dst_ai_gateway::utils::logging::init_logging(&logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config_path = cli.config.unwrap_or_else(AiConfig::path);

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Chat(args)) => {
            chat::cmd_chat(loaded.map_err(report)?, args, false).await?;
        }
        Some(Commands::Stream(args)) => {
            chat::cmd_chat(loaded.map_err(report)?, args, true).await?;
        }
        Some(Commands::CheckConfig) => {
            config::cmd_check_config(&config_path, loaded)?;
        }
    }

    Ok(())
}
