//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kbgate")]
#[command(
    author,
    version,
    about = "Knowledge-grounded chat completions over a retrying LLM client"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "KBGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve(ServeArgs),

    /// Ask a single question
    Ask(AskArgs),

    /// Print the composed system prompt
    Prompt(PromptArgs),

    /// Show configuration and knowledge base readiness
    Status,
}

impl Commands {
    /// Log level used when neither `RUST_LOG` nor `--verbose` says otherwise
    pub fn default_log_level(&self) -> tracing::Level {
        match self {
            Self::Serve(_) => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        }
    }
}

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to bind
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,
}

#[derive(Args)]
pub struct AskArgs {
    /// Question to send
    #[arg(required = true, num_args = 1..)]
    pub message: Vec<String>,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Sampling temperature in [0, 1]
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,
}

#[derive(Args)]
pub struct PromptArgs {
    /// Print sizes instead of the prompt text
    #[arg(long)]
    pub stats: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}
