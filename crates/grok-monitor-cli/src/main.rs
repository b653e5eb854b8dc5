//! Grok Monitor CLI - live rate limit countdowns for grok.com
//!
//! A command-line host for the monitor: watch countdowns as they run, inspect
//! the persisted snapshots, or poll a single category on demand.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use grok_monitor_core::db::STATE_PATH_ENV;
use grok_monitor_core::{Category, MonitorConfig};

#[derive(Parser)]
#[command(name = "grok-monitor")]
#[command(author, version, about = "Grok rate limit monitor", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: table (default) or json
    #[arg(long, global = true, default_value = "table")]
    format: output::OutputFormat,

    /// Suppress progress messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Override state database path (or set GROK_MONITOR_STATE_PATH env var)
    #[arg(long, env = "GROK_MONITOR_STATE_PATH", global = true)]
    state: Option<String>,

    /// Override the Grok origin (or set GROK_MONITOR_BASE_URL env var)
    #[arg(long, env = "GROK_MONITOR_BASE_URL", global = true)]
    base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor and print snapshot and countdown events
    Watch(commands::watch::WatchArgs),

    /// Show the persisted snapshot for every category
    Status,

    /// Poll one category now and store the result
    Refresh {
        /// Category: default, reasoning or deepsearch
        category: Category,
    },

    /// Erase all persisted snapshots
    Reset,

    /// List the tracked categories
    Categories,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    // Set up state path if provided
    if let Some(state_path) = &cli.state {
        std::env::set_var(STATE_PATH_ENV, state_path);
    }

    let mut config = MonitorConfig::from_env();
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.as_str()).validate();
    }

    // Create context for commands
    let ctx = commands::Context {
        config,
        format: cli.format,
        quiet: cli.quiet,
    };

    // Execute command
    match cli.command {
        Commands::Watch(args) => commands::watch::execute(&ctx, args).await,
        Commands::Status => commands::status::execute(&ctx).await,
        Commands::Refresh { category } => commands::refresh::execute(&ctx, category).await,
        Commands::Reset => commands::reset::execute(&ctx).await,
        Commands::Categories => commands::categories::execute(&ctx),
    }
}
