//! `overseer` command-line front end.

mod config;
mod plan;

use clap::{Parser, Subcommand};
use config::OverseerConfig;
use overseer_autonomy::AutonomyController;
use overseer_core::{AutonomyLevel, OperationCategory, TaskStatus};
use overseer_orchestrator::{Orchestrator, OrchestratorStateDocument, TaskRecord};
use overseer_state::{Increment, StateManager, Version};
use plan::Plan;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "overseer", about = "Overseer - supervised agent task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "overseer.toml", global = true)]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the persisted orchestrator state
    Status,
    /// Inspect or change the autonomy policy
    Autonomy {
        #[command(subcommand)]
        action: AutonomyAction,
    },
    /// Manage versioned state snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Check every state file parses; exits 1 on problems
    Validate,
    /// Run a TOML task plan with built-in echo agents
    Run {
        /// Plan file
        plan: PathBuf,
        /// Approve every task that lands in the approval queue
        #[arg(long)]
        auto_approve: bool,
    },
}

#[derive(Subcommand)]
enum AutonomyAction {
    /// Show level, approved and always-gated operations
    Show,
    /// Change the autonomy level
    Set { level: AutonomyLevel },
    /// Pre-approve an operation category at the current level
    Approve {
        operation: OperationCategory,
        #[arg(long, default_value = "approved from cli")]
        reason: String,
    },
    /// Withdraw a pre-approval at the current level
    Revoke { operation: OperationCategory },
    /// Safety score and recommendations
    Report,
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Snapshot the current state
    Create {
        #[arg(long)]
        label: Option<String>,
        /// major, minor or patch
        #[arg(long, default_value = "patch")]
        increment: Increment,
    },
    /// Restore a version (a safety snapshot is taken first)
    Restore { version: Version },
    /// List recorded versions
    List,
    /// Compare two versions
    Diff { from: Version, to: Version },
    /// Delete old snapshots
    Prune {
        /// Snapshots to keep (defaults to state.keep_snapshots)
        #[arg(long)]
        keep: Option<usize>,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = OverseerConfig::load(&cli.config)?;
    init_logging(cli.json || config.logging.json);

    let ws = config.workspace_dir.as_path();
    match cli.command {
        Commands::Status => status(ws).await?,
        Commands::Autonomy { action } => autonomy(ws, action).await?,
        Commands::Snapshot { action } => snapshot(ws, &config, action).await?,
        Commands::Validate => {
            let report = StateManager::new(ws).await?.validate_state().await?;
            print_json(&report)?;
            if !report.valid {
                std::process::exit(1);
            }
        }
        Commands::Run {
            plan: plan_path,
            auto_approve,
        } => {
            let plan = Plan::load(&plan_path)?;
            let orchestrator = Orchestrator::new(ws, config.orchestrator.clone()).await?;
            let records = plan::run_plan(&orchestrator, &plan, auto_approve).await?;
            orchestrator.shutdown().await?;

            print_outcomes(&records);
            if records.iter().any(|r| r.status != TaskStatus::Completed) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn status(ws: &Path) -> anyhow::Result<()> {
    match OrchestratorStateDocument::load(ws).await {
        Some(doc) => print_json(&doc)?,
        None => println!(
            "No orchestrator state recorded under {}",
            ws.display()
        ),
    }
    Ok(())
}

async fn autonomy(ws: &Path, action: AutonomyAction) -> anyhow::Result<()> {
    let controller = AutonomyController::load(ws).await?;
    match action {
        AutonomyAction::Show => print_json(&controller.status())?,
        AutonomyAction::Set { level } => {
            controller.set_level(level).await?;
            println!("Autonomy level set to {level}");
        }
        AutonomyAction::Approve { operation, reason } => {
            let id = controller.approve_operation(operation, &reason).await?;
            println!("Approved {operation} at {} ({id})", controller.level());
        }
        AutonomyAction::Revoke { operation } => {
            controller.revoke_approval(operation).await?;
            println!("Revoked {operation} at {}", controller.level());
        }
        AutonomyAction::Report => print_json(&controller.safety_report())?,
    }
    Ok(())
}

async fn snapshot(ws: &Path, config: &OverseerConfig, action: SnapshotAction) -> anyhow::Result<()> {
    let manager = StateManager::new(ws).await?;
    match action {
        SnapshotAction::Create { label, increment } => {
            let version = manager.create_snapshot(label.as_deref(), increment).await?;
            println!("Created snapshot v{version}");
        }
        SnapshotAction::Restore { version } => {
            if manager.restore_snapshot(version).await? {
                println!("Restored v{version} (now at v{})", manager.current_version().await);
            } else {
                anyhow::bail!("Snapshot v{version} not found");
            }
        }
        SnapshotAction::List => {
            let current = manager.current_version().await;
            let history = manager.version_history().await;
            if history.is_empty() {
                println!("No snapshots recorded.");
            }
            for entry in &history {
                let marker = if entry.version == current { "*" } else { " " };
                println!(
                    "{marker} v{:<10} {}  {:>4} files  {}  {}",
                    entry.version.to_string(),
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.file_count,
                    &entry.state_hash[..entry.state_hash.len().min(12)],
                    entry.label.as_deref().unwrap_or("")
                );
            }
        }
        SnapshotAction::Diff { from, to } => {
            print_json(&manager.get_version_diff(from, to).await?)?;
        }
        SnapshotAction::Prune { keep } => {
            let keep = keep.unwrap_or(config.state.keep_snapshots);
            let removed = manager.cleanup_old_snapshots(keep).await?;
            info!(removed, keep, "Snapshots pruned");
            println!("Removed {removed} snapshot(s)");
        }
    }
    Ok(())
}

fn print_outcomes(records: &[TaskRecord]) {
    println!("{:<24} {:<16} {:<18} DETAIL", "TASK", "AGENT", "STATUS");
    for record in records {
        let detail = match (&record.error, &record.result) {
            (Some(error), _) => error.clone(),
            (None, Some(result)) => result
                .output
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            (None, None) => String::new(),
        };
        println!(
            "{:<24} {:<16} {:<18} {}",
            record.task_id.as_str(),
            record.agent_name,
            record.status.to_string(),
            detail
        );
    }
}
