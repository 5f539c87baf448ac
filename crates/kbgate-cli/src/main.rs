//! Kbgate CLI
//!
//! Knowledge-grounded chat completions from the command line or over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use kbgate_core::{error::exit_codes, Config, KbgateError};

mod app;
mod commands;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        cli.command.default_log_level()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<KbgateError>()
            .map(KbgateError::exit_code)
            .unwrap_or(exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config).await,
        Commands::Ask(args) => commands::ask::run(args, &config).await,
        Commands::Prompt(args) => commands::prompt::run(args, &config, cli.format).await,
        Commands::Status => {
            commands::status::run(&config, cli.config.as_deref(), cli.format).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(KbgateError::Config(format!(
                    "config file not found: {}",
                    path.display()
                ))
                .into());
            }
            Config::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => Ok(Config::load()?),
    }
}
