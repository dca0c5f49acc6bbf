//! Pressure-driven auto-checkpoint and resume: the checkpoint is gathered
//! from git and the capsule without the agent's help, and a restarted
//! session gets a resume prompt naming the task and plan position.

use std::path::Path;
use std::process::Command;

use orchestration::paths::StateLayout;
use orchestration::pressure::{gather_context, CheckpointStore, PressureConfig, PressureTracker};
use orchestration::session::SessionRegistry;
use orchestration::store::write_string_atomic;

fn init_repo(dir: &Path) {
    let run = |args: &[&str]| {
        Command::new("git").args(args).current_dir(dir).output().unwrap();
    };
    run(&["init", "-b", "main"]);
    run(&["config", "user.email", "t@t.invalid"]);
    run(&["config", "user.name", "T"]);
    std::fs::write(dir.join("src.rs"), "fn main() {}").unwrap();
    run(&["add", "."]);
    run(&["commit", "-m", "scaffold auth module"]);
}

#[test]
fn auto_checkpoint_then_resume_prompt() {
    let project = tempfile::tempdir().unwrap();
    let repo = tempfile::tempdir().unwrap();
    init_repo(repo.path());

    let layout = StateLayout::new(project.path());
    let registry = SessionRegistry::new(layout.clone());
    let tracker = PressureTracker::new(layout.clone(), PressureConfig::default());
    let checkpoints = CheckpointStore::new(layout.clone());

    let session = registry.start("backend", None).unwrap();
    registry.claim(&session.session_id, "task-42").unwrap();

    // The capsule records the plan the agent was handed.
    write_string_atomic(
        &layout.session_capsule(&session.session_id),
        "# Capsule\nStep 2 of 5\n- [x] scaffold module\n- [ ] wire handler\n",
    )
    .unwrap();

    // 1200 calls, 500 KB of output: 62% of the 800 KiB budget.
    for _ in 0..1199 {
        tracker.record(&session.session_id, 417).unwrap();
    }
    let counter = tracker.record(&session.session_id, 17).unwrap();
    assert_eq!(counter.calls, 1200);

    let assessment = tracker.assess(&session.session_id).unwrap();
    assert!(assessment.should_checkpoint, "pct = {}", assessment.pct);
    assert!(!assessment.should_nudge);

    // Uncommitted edits show up in the gathered file list.
    std::fs::write(repo.path().join("src.rs"), "fn main() { auth() }").unwrap();

    let record = registry.load(&session.session_id).unwrap();
    let gathered = gather_context(&layout, &record, repo.path(), counter.calls);
    assert_eq!(gathered.task_id.as_deref(), Some("task-42"));
    assert!(gathered.files_modified.contains(&"src.rs".to_string()));
    assert!(gathered.files_modified.len() <= 20);
    assert!(gathered.current_context.contains("1200"));
    assert_eq!(gathered.plan_step, 2);
    assert_eq!(gathered.total_steps, 5);
    assert!(gathered
        .key_decisions
        .iter()
        .any(|d| d.contains("scaffold auth module")));

    let saved = checkpoints.save(&session.session_id, gathered.clone()).unwrap();
    assert_eq!(saved.version, 1);

    // Restorable fields round-trip.
    let loaded = checkpoints.load_latest(&session.session_id).unwrap().unwrap();
    assert_eq!(loaded.task_id, gathered.task_id);
    assert_eq!(loaded.plan_step, gathered.plan_step);
    assert_eq!(loaded.total_steps, gathered.total_steps);
    assert_eq!(loaded.files_modified, gathered.files_modified);
    assert_eq!(loaded.completed_steps, gathered.completed_steps);

    // A resumed session start renders the prompt.
    let prompt = checkpoints
        .resume_prompt(&session.session_id)
        .unwrap()
        .expect("resume prompt exists");
    assert!(prompt.contains("task-42"));
    assert!(prompt.contains("step 2 of 5"));
    assert!(prompt.contains("scaffold module"));
    assert!(prompt.contains("src.rs"));
}

#[test]
fn pressure_survives_process_restart() {
    let project = tempfile::tempdir().unwrap();
    let layout = StateLayout::new(project.path());

    {
        let tracker = PressureTracker::new(layout.clone(), PressureConfig::default());
        tracker.record("sess-r", 400_000).unwrap();
    }

    // A fresh tracker (a restarted process) sees the same counters.
    let tracker = PressureTracker::new(layout, PressureConfig::default());
    let counter = tracker.load("sess-r").unwrap();
    assert_eq!(counter.bytes, 400_000);
    assert_eq!(counter.calls, 1);
}
