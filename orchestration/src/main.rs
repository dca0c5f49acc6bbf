//! `pilot-pm` — run the PM supervisor over a project's state tree.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use orchestration::adapters::{
    LogChannel, NotificationChannel, NotificationRouter, WebhookChannel,
};
use orchestration::config::PilotConfig;
use orchestration::paths::StateLayout;
use orchestration::pm::PmLoop;
use orchestration::session::SessionRegistry;

#[derive(Parser)]
#[command(name = "pilot-pm", about = "PM supervisor for a Pilot agent fleet")]
struct Cli {
    /// Project root holding the state/ and memory/ trees.
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Policy document path (YAML). Defaults under the project root.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop until interrupted.
    Run,
    /// Execute exactly one tick and print the report.
    Tick,
    /// Print session health and queue depth.
    Status,
    /// Print pending actions.
    Queue,
    /// Drain one pending action to stdout for the PM agent's prompt cycle.
    Drain,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let layout = StateLayout::new(&cli.project);
    let config_path = cli
        .config
        .unwrap_or_else(|| cli.project.join("pilot.yaml"));
    let config = PilotConfig::load(&config_path)
        .with_context(|| format!("loading policy from {}", config_path.display()))?;

    let mut channels: Vec<Box<dyn NotificationChannel>> = vec![Box::new(LogChannel)];
    for webhook in &config.notifications.webhooks {
        channels.push(Box::new(WebhookChannel::new(&webhook.name, &webhook.url)));
    }
    let notifier = NotificationRouter::new(channels, &config.notifications.primary_channel);
    let heartbeat = chrono::Duration::seconds(config.session.heartbeat_interval_sec as i64);

    let pm = PmLoop::new(layout.clone(), config, notifier);

    match cli.command {
        Command::Run => {
            tokio::select! {
                _ = pm.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                }
            }
        }
        Command::Tick => {
            let report = pm.tick();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Status => {
            let registry = SessionRegistry::new(layout);
            for session in registry.list().context("reading session registry")? {
                let health = registry
                    .health(&session, heartbeat)
                    .map(|h| format!("{h:?}"))
                    .unwrap_or_else(|e| format!("error: {e}"));
                println!(
                    "{}\trole={}\tstatus={:?}\thealth={}\ttask={}",
                    session.session_id,
                    session.role,
                    session.status,
                    health,
                    session.claimed_task.as_deref().unwrap_or("-"),
                );
            }
            let pending = pm.queue().pending().context("reading action queue")?;
            println!("pending actions: {}", pending.len());
        }
        Command::Queue => {
            for action in pm.queue().pending().context("reading action queue")? {
                println!(
                    "{}\t{:?}\t{:?}\t{}",
                    action.id, action.action_type, action.priority, action.data
                );
            }
        }
        Command::Drain => {
            use orchestration::actions::{ActionQueue, DrainConfig, DrainOutcome, QueueDrain};

            let mut drain = QueueDrain::new(ActionQueue::new(layout), DrainConfig::default());
            // Delivery here is stdout; the caller is the PM agent itself,
            // so it is always reachable.
            let outcome = drain.attempt(
                || true,
                |action| {
                    serde_json::to_string_pretty(action)
                        .map(|json| println!("{json}"))
                        .is_ok()
                },
            )?;
            match outcome {
                DrainOutcome::Delivered(id) => eprintln!("delivered {id}"),
                DrainOutcome::Empty => eprintln!("queue empty"),
                DrainOutcome::BackOff(wait) => eprintln!("backing off {}s", wait.as_secs()),
            }
        }
    }
    Ok(())
}
