//! Checkpoint save/load and context gathering.
//!
//! Checkpoints are numbered (`<sid>.v<N>.json`), save always creates the
//! next version and load picks the maximum. Context for an auto-checkpoint
//! is gathered without the agent's help: the claimed task, git's view of
//! modified files, recent commit subjects, and plan progress parsed from the
//! session capsule.

use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::paths::StateLayout;
use crate::session::SessionRecord;
use crate::store::{read_json, write_json_atomic, StoreResult};
use crate::util::run_git;

/// Cap on files gathered from git diff output.
const MAX_MODIFIED_FILES: usize = 20;

/// Commit subjects pulled in as key decisions.
const DECISION_LOG_DEPTH: usize = 10;

/// One saved checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u64,
    pub task_id: Option<String>,
    pub task_title: Option<String>,
    pub plan_step: u32,
    pub total_steps: u32,
    pub completed_steps: Vec<String>,
    pub files_modified: Vec<String>,
    pub current_context: String,
    pub key_decisions: Vec<String>,
    pub important_findings: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

/// Plan position parsed out of a capsule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanProgress {
    pub step: u32,
    pub total: u32,
    pub completed: Vec<String>,
}

/// Parse `Step X of Y` and `- [x] done thing` markers from capsule text.
pub fn parse_plan_progress(capsule: &str) -> PlanProgress {
    let step_re = Regex::new(r"(?i)\bStep\s+(\d+)\s+of\s+(\d+)\b").expect("static regex");
    let checked_re = Regex::new(r"^\s*-\s*\[[xX]\]\s*(.+)$").expect("static regex");
    let unchecked_re = Regex::new(r"^\s*-\s*\[\s\]").expect("static regex");

    let mut progress = PlanProgress::default();
    let mut unchecked = 0u32;

    for line in capsule.lines() {
        if let Some(caps) = step_re.captures(line) {
            progress.step = caps[1].parse().unwrap_or(0);
            progress.total = caps[2].parse().unwrap_or(0);
        }
        if let Some(caps) = checked_re.captures(line) {
            progress.completed.push(caps[1].trim().to_string());
        } else if unchecked_re.is_match(line) {
            unchecked += 1;
        }
    }

    // No explicit step marker: derive position from the checkboxes.
    if progress.total == 0 && (!progress.completed.is_empty() || unchecked > 0) {
        let done = progress.completed.len() as u32;
        progress.total = done + unchecked;
        progress.step = (done + 1).min(progress.total.max(1));
    }
    progress
}

/// Gather checkpoint context for a session without its cooperation.
pub fn gather_context(
    layout: &StateLayout,
    session: &SessionRecord,
    repo_root: &Path,
    counter_calls: u64,
) -> Checkpoint {
    let mut files: Vec<String> = Vec::new();
    for args in [
        &["diff", "--name-only", "HEAD"][..],
        &["diff", "--cached", "--name-only"][..],
    ] {
        if let Some(out) = run_git(repo_root, args) {
            for line in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if !files.iter().any(|f| f == line) {
                    files.push(line.to_string());
                }
            }
        }
    }
    files.truncate(MAX_MODIFIED_FILES);

    let decisions: Vec<String> = run_git(
        repo_root,
        &["log", "--oneline", &format!("-{DECISION_LOG_DEPTH}")],
    )
    .map(|out| out.lines().map(str::to_string).collect())
    .unwrap_or_default();

    let capsule = std::fs::read_to_string(layout.session_capsule(&session.session_id))
        .unwrap_or_default();
    let progress = parse_plan_progress(&capsule);

    Checkpoint {
        version: 0, // assigned by the store on save
        task_id: session.claimed_task.clone(),
        task_title: None,
        plan_step: progress.step,
        total_steps: progress.total,
        completed_steps: progress.completed,
        files_modified: files,
        current_context: format!(
            "auto-checkpoint after {counter_calls} tool calls in role {}",
            session.role
        ),
        key_decisions: decisions,
        important_findings: Vec::new(),
        saved_at: Utc::now(),
    }
}

/// Numbered checkpoint storage.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    layout: StateLayout,
}

impl CheckpointStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// Save as the next version for this session; returns the stored copy.
    pub fn save(&self, session_id: &str, mut checkpoint: Checkpoint) -> StoreResult<Checkpoint> {
        let version = self.latest_version(session_id)? + 1;
        checkpoint.version = version;
        checkpoint.saved_at = Utc::now();
        write_json_atomic(&self.layout.checkpoint(session_id, version), &checkpoint)?;
        info!(session_id, version, "checkpoint saved");
        Ok(checkpoint)
    }

    /// Load the highest-version checkpoint, if any.
    pub fn load_latest(&self, session_id: &str) -> StoreResult<Option<Checkpoint>> {
        let version = self.latest_version(session_id)?;
        if version == 0 {
            return Ok(None);
        }
        read_json(&self.layout.checkpoint(session_id, version))
    }

    fn latest_version(&self, session_id: &str) -> StoreResult<u64> {
        let dir = self.layout.checkpoints_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(crate::store::StoreError::io(&dir, e)),
        };

        let prefix = format!("{session_id}.v");
        let mut max = 0u64;
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let Some(num) = rest.strip_suffix(".json") else {
                continue;
            };
            if let Ok(version) = num.parse::<u64>() {
                max = max.max(version);
            }
        }
        Ok(max)
    }

    /// Render the latest checkpoint as a resume prompt for a restarted
    /// session. `None` when there is nothing to resume.
    pub fn resume_prompt(&self, session_id: &str) -> StoreResult<Option<String>> {
        let Some(cp) = self.load_latest(session_id)? else {
            return Ok(None);
        };

        let mut prompt = String::from("Resuming a checkpointed session.\n");
        if let Some(task_id) = &cp.task_id {
            prompt.push_str(&format!("Task: {task_id}"));
            if let Some(title) = &cp.task_title {
                prompt.push_str(&format!(" — {title}"));
            }
            prompt.push('\n');
        }
        if cp.total_steps > 0 {
            prompt.push_str(&format!(
                "Plan position: step {} of {}\n",
                cp.plan_step, cp.total_steps
            ));
        }
        if !cp.completed_steps.is_empty() {
            prompt.push_str("Completed steps:\n");
            for step in &cp.completed_steps {
                prompt.push_str(&format!("  - {step}\n"));
            }
        }
        if !cp.files_modified.is_empty() {
            prompt.push_str("Files already modified:\n");
            for file in &cp.files_modified {
                prompt.push_str(&format!("  - {file}\n"));
            }
        }
        if !cp.key_decisions.is_empty() {
            prompt.push_str("Recent decisions:\n");
            for decision in &cp.key_decisions {
                prompt.push_str(&format!("  - {decision}\n"));
            }
        }
        prompt.push_str(&format!("Context: {}\n", cp.current_context));
        Ok(Some(prompt))
    }
}
