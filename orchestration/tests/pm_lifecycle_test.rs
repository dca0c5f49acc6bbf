//! PM loop end-to-end: dead-agent cleanup frees the task for re-routing,
//! and the event log tells the whole story.

use chrono::Utc;
use serde_json::Value;

use orchestration::actions::ActionType;
use orchestration::adapters::{LogChannel, NotificationChannel, NotificationRouter};
use orchestration::config::PilotConfig;
use orchestration::paths::StateLayout;
use orchestration::pm::{CachedTask, PmLoop, TaskState};
use orchestration::router::{RoleProfile, TaskSpec};
use orchestration::session::SessionLock;
use orchestration::store::write_json_atomic;

fn pm_with_frontend(dir: &std::path::Path) -> PmLoop {
    let mut config = PilotConfig::defaults();
    config.roles = vec![RoleProfile {
        role: "frontend".into(),
        task_keywords: vec!["ui".into(), "component".into(), "css".into()],
        file_patterns: vec!["src/components/**".into()],
        areas: vec!["login".into()],
    }];
    let channels: Vec<Box<dyn NotificationChannel>> = vec![Box::new(LogChannel)];
    PmLoop::new(
        StateLayout::new(dir),
        config,
        NotificationRouter::new(channels, "log"),
    )
}

#[test]
fn dead_agent_cleanup_makes_task_reroutable() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StateLayout::new(dir.path());
    let pm = pm_with_frontend(dir.path());

    // An agent claims the login task, then its process vanishes.
    let session = pm.sessions().start("frontend", None).unwrap();
    pm.sessions().claim(&session.session_id, "task-login").unwrap();
    write_json_atomic(
        &layout.session_lockfile(&session.session_id),
        &SessionLock {
            session_id: session.session_id.clone(),
            pid: 99_999_999,
            created_at: Utc::now(),
        },
    )
    .unwrap();

    // The task is back in the open backlog.
    let task = CachedTask {
        spec: TaskSpec {
            task_id: "task-login".into(),
            title: "fix login button padding".into(),
            description: "login css".into(),
            labels: vec!["ui".into()],
            files: vec!["src/components/Login.tsx".into()],
        },
        state: TaskState::Open,
    };

    // Tick 1: detect death, release the claim, queue the cleanup.
    let report = pm.tick();
    assert_eq!(report.dead_cleaned, 1);
    assert!(!layout.session_lockfile(&session.session_id).exists());
    assert!(!layout.task_claim("task-login").exists());

    let pending = pm.queue().pending().unwrap();
    let cleanup = pending
        .iter()
        .find(|a| a.action_type == ActionType::SessionCleanup)
        .expect("cleanup action queued");
    assert_eq!(cleanup.data["orphaned_task"], "task-login");

    // Tick 2: with the backlog refreshed, the orphaned task routes again.
    orchestration::pm::TaskCache::new(layout.clone())
        .save(&[task])
        .unwrap();
    let report = pm.tick();
    assert_eq!(report.assignments, 1);

    // Event log carries the full trail.
    let events: Vec<Value> = std::fs::read_to_string(layout.event_log())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let types: Vec<&str> = events.iter().filter_map(|e| e["type"].as_str()).collect();
    assert!(types.contains(&"session_start"));
    assert!(types.contains(&"task_claimed"));
    assert!(types.contains(&"task_released"));
    assert!(types.contains(&"pm_dead_agent_cleanup"));
}

#[test]
fn stale_agent_released_under_policy() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StateLayout::new(dir.path());
    let pm = pm_with_frontend(dir.path());

    let session = pm.sessions().start("frontend", None).unwrap();
    pm.sessions().claim(&session.session_id, "task-x").unwrap();

    // Age the heartbeat past 2x the interval while the process stays alive.
    let mut record = pm.sessions().load(&session.session_id).unwrap();
    record.last_heartbeat = Utc::now() - chrono::Duration::seconds(75);
    write_json_atomic(&layout.session_record(&session.session_id), &record).unwrap();

    let report = pm.tick();
    assert_eq!(report.stale_cleaned, 1);

    // The claim is gone and the record is flagged.
    let record = pm.sessions().load(&session.session_id).unwrap();
    assert!(record.claimed_task.is_none());
    assert!(!layout.task_claim("task-x").exists());

    let pending = pm.queue().pending().unwrap();
    assert!(pending
        .iter()
        .any(|a| a.action_type == ActionType::SessionCleanup
            && a.data["reason"] == "stale"));
}
