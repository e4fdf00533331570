use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "cockpit")]
#[command(version, about = "Console for a remote task-execution engine")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Engine base URL. Overrides cockpit.toml and COCKPIT_ENGINE_URL.
    #[arg(long, global = true)]
    pub engine_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask the engine to draft an execution plan for a task
    Plan {
        /// What to do, in plain language
        task: String,
    },
    /// Confirm the drafted plan and execute it
    Confirm,
    /// Show the workspace's lock, pending request, and chat state
    Status,
    /// Follow the active run until it finishes
    Watch,
    /// Accept the reviewed run's changes
    Apply,
    /// Reject the reviewed run's changes
    Discard,
    /// Stop the active run
    Cancel,
    /// Send a chat message to the engine
    Chat {
        message: String,
    },
    /// Clear the workflow lock unconditionally
    Unlock {
        /// Unlock even while a run appears to be executing
        #[arg(long)]
        force: bool,
    },
    /// Reconcile an interrupted request against the engine
    Recover,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.workspace.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let mut session = cmd::Session::open(&project_dir, cli.engine_url.as_deref()).await?;

    match &cli.command {
        Commands::Plan { task } => cmd::cmd_plan(&mut session, task).await?,
        Commands::Confirm => cmd::cmd_confirm(&mut session).await?,
        Commands::Status => cmd::cmd_status(&session).await?,
        Commands::Watch => cmd::cmd_watch(&mut session).await?,
        Commands::Apply => cmd::cmd_apply(&mut session).await?,
        Commands::Discard => cmd::cmd_discard(&mut session).await?,
        Commands::Cancel => cmd::cmd_cancel(&mut session).await?,
        Commands::Chat { message } => cmd::cmd_chat(&mut session, message).await?,
        Commands::Unlock { force } => cmd::cmd_unlock(&session, *force).await?,
        Commands::Recover => cmd::cmd_recover(&mut session).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "cockpit=debug" } else { "cockpit=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
