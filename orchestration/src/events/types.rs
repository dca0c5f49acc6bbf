//! Event vocabulary for the global log.
//!
//! Each line is a flat JSON object `{type, ts, session_id?, …}` so external
//! tooling can filter with nothing fancier than a string match on `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of `sessions.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,
    pub ts: DateTime<Utc>,
}

/// All recorded event kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SessionStart {
        session_id: String,
        role: String,
    },
    SessionEnd {
        session_id: String,
        reason: String,
    },
    TaskClaimed {
        session_id: String,
        task_id: String,
    },
    TaskReleased {
        session_id: String,
        task_id: String,
    },
    MemoryPublished {
        session_id: Option<String>,
        channel: String,
        version: u64,
    },
    PmTaskAssigned {
        session_id: String,
        task_id: String,
        score: f64,
    },
    PmTaskReassigned {
        session_id: String,
        task_id: String,
        previous_session_id: String,
    },
    PmAgentBlocked {
        session_id: String,
        reason: String,
    },
    PmMergeApproved {
        session_id: String,
        task_id: String,
    },
    PmStaleCleanup {
        session_id: String,
        task_id: Option<String>,
    },
    PmDeadAgentCleanup {
        session_id: String,
        task_id: Option<String>,
    },
}

impl Event {
    fn now(kind: EventKind) -> Self {
        Self {
            kind,
            ts: Utc::now(),
        }
    }

    pub fn session_start(session_id: &str, role: &str) -> Self {
        Self::now(EventKind::SessionStart {
            session_id: session_id.to_string(),
            role: role.to_string(),
        })
    }

    pub fn session_end(session_id: &str, reason: &str) -> Self {
        Self::now(EventKind::SessionEnd {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
        })
    }

    pub fn task_claimed(session_id: &str, task_id: &str) -> Self {
        Self::now(EventKind::TaskClaimed {
            session_id: session_id.to_string(),
            task_id: task_id.to_string(),
        })
    }

    pub fn task_released(session_id: &str, task_id: &str) -> Self {
        Self::now(EventKind::TaskReleased {
            session_id: session_id.to_string(),
            task_id: task_id.to_string(),
        })
    }

    pub fn memory_published(session_id: Option<&str>, channel: &str, version: u64) -> Self {
        Self::now(EventKind::MemoryPublished {
            session_id: session_id.map(str::to_string),
            channel: channel.to_string(),
            version,
        })
    }

    pub fn pm_task_assigned(session_id: &str, task_id: &str, score: f64) -> Self {
        Self::now(EventKind::PmTaskAssigned {
            session_id: session_id.to_string(),
            task_id: task_id.to_string(),
            score,
        })
    }

    pub fn pm_task_reassigned(session_id: &str, task_id: &str, previous: &str) -> Self {
        Self::now(EventKind::PmTaskReassigned {
            session_id: session_id.to_string(),
            task_id: task_id.to_string(),
            previous_session_id: previous.to_string(),
        })
    }

    pub fn pm_agent_blocked(session_id: &str, reason: &str) -> Self {
        Self::now(EventKind::PmAgentBlocked {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
        })
    }

    pub fn pm_merge_approved(session_id: &str, task_id: &str) -> Self {
        Self::now(EventKind::PmMergeApproved {
            session_id: session_id.to_string(),
            task_id: task_id.to_string(),
        })
    }

    pub fn pm_stale_cleanup(session_id: &str, task_id: Option<&str>) -> Self {
        Self::now(EventKind::PmStaleCleanup {
            session_id: session_id.to_string(),
            task_id: task_id.map(str::to_string),
        })
    }

    pub fn pm_dead_agent_cleanup(session_id: &str, task_id: Option<&str>) -> Self {
        Self::now(EventKind::PmDeadAgentCleanup {
            session_id: session_id.to_string(),
            task_id: task_id.map(str::to_string),
        })
    }
}
