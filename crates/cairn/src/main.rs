//! Cairn - project memory and context retrieval for coding agents
//!
//! Main entry point for the Cairn CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::Style;

mod commands;

use commands::{clear, context, history, reindex, remember, reminders, stats, tasks};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Cairn - project memory and context retrieval for coding agents
#[derive(Parser)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding config.toml (default: ~/.config/cairn)
    #[arg(long, global = true, env = "CAIRN_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Project directory to operate on (default: current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show project identity, record counts and backend reachability
    Stats(stats::StatsArgs),

    /// Store a memory in the current project
    Remember(remember::RememberArgs),

    /// Select relevant memories for a query
    Context(context::ContextArgs),

    /// Manage project tasks
    Tasks(tasks::TasksArgs),

    /// Show or reset the discussion history
    History(history::HistoryArgs),

    /// Show reminders and recent activity from the relationship graph
    Reminders(reminders::RemindersArgs),

    /// Re-embed and re-mirror all memories from the record store
    Reindex(reindex::ReindexArgs),

    /// Delete all tasks, memories and discussion turns of the project
    Clear(clear::ClearArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "cairn=debug,cairn_memory=debug,cairn_config=debug,cairn_llm=debug,warn"
    } else {
        "cairn=info,warn"
    };

    let log_dir = cli
        .config_dir
        .clone()
        .or_else(cairn_config::user_config_dir)
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "cairn.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "cairn=trace,cairn_memory=trace,cairn_config=trace,cairn_llm=trace,info",
                )),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let red = Style::new().red().bold();
            eprintln!("{} {e:#}", red.apply_to("Error:"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let project_dir = match cli.project {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config_dir: cli.config_dir,
        project_dir,
    };

    match cli.command {
        Commands::Stats(args) => stats::run(args, &ctx).await,
        Commands::Remember(args) => remember::run(args, &ctx).await,
        Commands::Context(args) => context::run(args, &ctx).await,
        Commands::Tasks(args) => tasks::run(args, &ctx).await,
        Commands::History(args) => history::run(args, &ctx).await,
        Commands::Reminders(args) => reminders::run(args, &ctx).await,
        Commands::Reindex(args) => reindex::run(args, &ctx).await,
        Commands::Clear(args) => clear::run(args, &ctx).await,
    }
}
