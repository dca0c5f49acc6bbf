//! Filesystem layout — every path the orchestrator reads or writes.
//!
//! The canonical shared store is a project-rooted tree; agents and the PM
//! communicate exclusively through these files. Exact paths matter for
//! interoperability, so they are all computed in one place.
//!
//! ```text
//! state/sessions/<sid>.json             session record
//! state/sessions/<sid>.lock             lockfile (PID-bearing)
//! state/sessions/<sid>.pressure.json    pressure counters
//! state/sessions/<sid>.capsule.md       context capsule handed to the agent
//! state/tasks/<task>.claim              exclusive claim marker
//! state/checkpoints/<sid>.v<N>.json     numbered checkpoints
//! state/orchestrator/pm-state.json      PM self-checkpoint
//! state/orchestrator/pm-action-queue.json
//! state/orchestrator/pm-action-history.jsonl
//! state/drift-predictions/<sid>.json
//! state/drift-predictions/guardrail-stats.json
//! memory/channels/<channel>.json        versioned envelope
//! memory/agents/<role>/...              per-agent logs
//! memory/archive/<channel>/entries.jsonl
//! memory/schemas/<channel>.schema.json
//! memory/index.json                     channel registry
//! registry/{pages,components,apis,database}.json
//! logs/agent-<taskId>.log[.1|.2|.3]
//! sessions.jsonl                        global append-only event log
//! ```

use std::path::{Path, PathBuf};

/// Resolves every orchestrator path relative to a project root.
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    /// Create a layout rooted at the given project directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The project root this layout is anchored to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // -- state/ ------------------------------------------------------------

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("state").join("sessions")
    }

    pub fn session_record(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{session_id}.json"))
    }

    pub fn session_lockfile(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{session_id}.lock"))
    }

    pub fn session_pressure(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{session_id}.pressure.json"))
    }

    pub fn session_capsule(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{session_id}.capsule.md"))
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join("state").join("tasks")
    }

    pub fn task_claim(&self, task_id: &str) -> PathBuf {
        self.tasks_dir().join(format!("{task_id}.claim"))
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("state").join("checkpoints")
    }

    pub fn checkpoint(&self, session_id: &str, version: u64) -> PathBuf {
        self.checkpoints_dir()
            .join(format!("{session_id}.v{version}.json"))
    }

    pub fn orchestrator_dir(&self) -> PathBuf {
        self.root.join("state").join("orchestrator")
    }

    pub fn pm_state(&self) -> PathBuf {
        self.orchestrator_dir().join("pm-state.json")
    }

    pub fn action_queue(&self) -> PathBuf {
        self.orchestrator_dir().join("pm-action-queue.json")
    }

    pub fn action_history(&self) -> PathBuf {
        self.orchestrator_dir().join("pm-action-history.jsonl")
    }

    /// Local cache of the external task tracker (minimum metadata only).
    pub fn task_cache(&self) -> PathBuf {
        self.orchestrator_dir().join("task-cache.json")
    }

    pub fn drift_dir(&self) -> PathBuf {
        self.root.join("state").join("drift-predictions")
    }

    pub fn drift_predictions(&self, session_id: &str) -> PathBuf {
        self.drift_dir().join(format!("{session_id}.json"))
    }

    pub fn guardrail_stats(&self) -> PathBuf {
        self.drift_dir().join("guardrail-stats.json")
    }

    // -- memory/ -----------------------------------------------------------

    pub fn channels_dir(&self) -> PathBuf {
        self.root.join("memory").join("channels")
    }

    pub fn channel(&self, name: &str) -> PathBuf {
        self.channels_dir().join(format!("{name}.json"))
    }

    pub fn channel_schema(&self, name: &str) -> PathBuf {
        self.root
            .join("memory")
            .join("schemas")
            .join(format!("{name}.schema.json"))
    }

    pub fn memory_index(&self) -> PathBuf {
        self.root.join("memory").join("index.json")
    }

    pub fn agent_dir(&self, role: &str) -> PathBuf {
        self.root.join("memory").join("agents").join(role)
    }

    pub fn agent_preferences(&self, role: &str) -> PathBuf {
        self.agent_dir(role).join("preferences.json")
    }

    pub fn agent_log(&self, role: &str, kind: &str) -> PathBuf {
        self.agent_dir(role).join(format!("{kind}.jsonl"))
    }

    pub fn archive_entries(&self, channel: &str) -> PathBuf {
        self.root
            .join("memory")
            .join("archive")
            .join(channel)
            .join("entries.jsonl")
    }

    // -- registry/ ---------------------------------------------------------

    pub fn registry_domain(&self, domain: &str) -> PathBuf {
        self.root.join("registry").join(format!("{domain}.json"))
    }

    // -- logs/ -------------------------------------------------------------

    pub fn agent_process_log(&self, task_id: &str) -> PathBuf {
        self.root.join("logs").join(format!("agent-{task_id}.log"))
    }

    // -- global ------------------------------------------------------------

    pub fn event_log(&self) -> PathBuf {
        self.root.join("sessions.jsonl")
    }
}
