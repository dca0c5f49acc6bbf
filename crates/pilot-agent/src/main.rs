//! `pilot-agent` — the agent-side half of the filesystem contract.
//!
//! Shell hooks around a coding-assistant CLI call these subcommands to keep
//! the session record, pressure counters and checkpoints current. On start
//! with `PILOT_IS_RESUME=1` the latest checkpoint is rendered as a resume
//! prompt on stdout.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use orchestration::config::PilotConfig;
use orchestration::paths::StateLayout;
use orchestration::pressure::{gather_context, CheckpointStore, PressureTracker, RESUME_ENV};
use orchestration::session::{ClaimOutcome, SessionRegistry};

#[derive(Parser)]
#[command(name = "pilot-agent", about = "Session lifecycle for one Pilot agent")]
struct Cli {
    /// Project root holding the state/ tree.
    #[arg(long, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a session; prints its id (and a resume prompt on resume).
    Start {
        #[arg(long)]
        role: String,
        #[arg(long)]
        worktree: Option<PathBuf>,
        /// Resume from this prior session's checkpoints.
        #[arg(long)]
        resume_from: Option<String>,
    },
    /// Refresh the heartbeat and lease.
    Heartbeat {
        #[arg(long)]
        session: String,
    },
    /// Claim a task; exits non-zero on conflict.
    Claim {
        #[arg(long)]
        session: String,
        #[arg(long)]
        task: String,
    },
    /// Release the current claim.
    Release {
        #[arg(long)]
        session: String,
    },
    /// End the session.
    End {
        #[arg(long)]
        session: String,
        #[arg(long, default_value = "finished")]
        reason: String,
    },
    /// Record one tool call's output volume; prints the assessment.
    Pressure {
        #[arg(long)]
        session: String,
        #[arg(long)]
        bytes: u64,
    },
    /// Save a checkpoint gathered from git and the session capsule.
    Checkpoint {
        #[arg(long)]
        session: String,
        /// Repository the agent is editing (defaults to the project root).
        #[arg(long)]
        repo: Option<PathBuf>,
        /// Reset pressure counters after saving (compact handshake).
        #[arg(long)]
        compact: bool,
    },
    /// Print the resume prompt for a session, if any.
    Resume {
        #[arg(long)]
        session: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let layout = StateLayout::new(&cli.project);
    let config = PilotConfig::load(&cli.project.join("pilot.yaml")).unwrap_or_default();
    let registry = SessionRegistry::new(layout.clone())
        .with_lease_duration(chrono::Duration::minutes(config.session.lease_minutes));
    let tracker = PressureTracker::new(layout.clone(), config.pressure.clone());
    let checkpoints = CheckpointStore::new(layout.clone());

    match cli.command {
        Command::Start {
            role,
            worktree,
            resume_from,
        } => {
            let record = registry.start(&role, worktree).context("starting session")?;
            println!("{}", record.session_id);

            let is_resume = std::env::var(RESUME_ENV).map(|v| v == "1").unwrap_or(false);
            if is_resume {
                let source = resume_from.as_deref().unwrap_or(&record.session_id);
                if let Some(prompt) = checkpoints.resume_prompt(source)? {
                    println!("{prompt}");
                }
            }
        }
        Command::Heartbeat { session } => {
            registry.heartbeat(&session).context("heartbeat")?;
        }
        Command::Claim { session, task } => {
            match registry.claim(&session, &task).context("claiming task")? {
                ClaimOutcome::Ok => println!("claimed {task}"),
                ClaimOutcome::Conflict { owner } => {
                    bail!("task {task} already claimed by {owner}");
                }
            }
        }
        Command::Release { session } => {
            registry.release(&session).context("releasing claim")?;
        }
        Command::End { session, reason } => {
            registry.end(&session, &reason).context("ending session")?;
        }
        Command::Pressure { session, bytes } => {
            tracker.record(&session, bytes).context("recording pressure")?;
            let assessment = tracker.assess(&session)?;
            println!("{}", serde_json::to_string(&assessment)?);
        }
        Command::Checkpoint {
            session,
            repo,
            compact,
        } => {
            let record = registry.load(&session).context("loading session")?;
            let counter = tracker.load(&session)?;
            let repo = repo.unwrap_or_else(|| cli.project.clone());
            let checkpoint = gather_context(&layout, &record, &repo, counter.calls);
            let saved = checkpoints.save(&session, checkpoint)?;
            println!("checkpoint v{} saved", saved.version);
            if compact {
                tracker.reset(&session)?;
            }
        }
        Command::Resume { session } => match checkpoints.resume_prompt(&session)? {
            Some(prompt) => println!("{prompt}"),
            None => println!("no checkpoint for {session}"),
        },
    }
    Ok(())
}
