//! recall CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive chat backed by working memory
//! - `history` — Print a session's archived messages
//! - `show`    — Print a session's working memory partitions and pins
//! - `recover` — Rebuild working memory from the archive
//! - `clear`   — Delete everything stored for a session
//! - `config`  — Print the active or default configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "recall",
    about = "recall — bounded working memory for LLM conversations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to ~/.recall/config.toml)
    #[arg(short, long, global = true, env = "RECALL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with memory
    Chat {
        /// Resume a session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,

        /// Use a local echo provider instead of the configured endpoint
        #[arg(long)]
        offline: bool,
    },

    /// Print archived messages
    History {
        #[arg(short, long)]
        session: String,

        /// Include tool traffic and tool-calling assistant turns
        #[arg(long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// Print working memory partitions and pins
    Show {
        #[arg(short, long)]
        session: String,

        #[arg(long)]
        json: bool,
    },

    /// Rebuild head and tail from the archive
    Recover {
        #[arg(short, long)]
        session: String,
    },

    /// Delete a session's archive and working memory
    Clear {
        #[arg(short, long)]
        session: String,

        #[arg(long)]
        confirm: bool,
    },

    /// Print configuration
    Config {
        /// Print the built-in defaults instead of the loaded config
        #[arg(long)]
        default: bool,

        /// Print the config file location
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Chat { session, offline } => {
            commands::chat::run(config_path, session, offline).await?
        }
        Commands::History { session, all, json } => {
            commands::inspect::history(config_path, &session, all, json).await?
        }
        Commands::Show { session, json } => {
            commands::inspect::show(config_path, &session, json).await?
        }
        Commands::Recover { session } => {
            commands::inspect::recover(config_path, &session).await?
        }
        Commands::Clear { session, confirm } => {
            commands::inspect::clear(config_path, &session, confirm).await?
        }
        Commands::Config { default, path } => commands::config_cmd::run(config_path, default, path)?,
    }

    Ok(())
}
