//! Per-agent memory logs.
//!
//! Each role owns `memory/agents/<role>/` with append-only JSONL logs for
//! decisions, errors and discoveries, plus a `preferences.json` document.
//! Readers tolerate malformed lines; preferences are never pruned.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MemoryResult;
use crate::paths::StateLayout;
use crate::store::{
    append_jsonl, read_json_or_quarantine, read_jsonl, rewrite_jsonl_atomic, write_json_atomic,
};

/// The three append-only log kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Decisions,
    Errors,
    Discoveries,
}

impl LogKind {
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Decisions => "decisions",
            Self::Errors => "errors",
            Self::Discoveries => "discoveries",
        }
    }
}

/// One log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub ts: DateTime<Utc>,
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub payload: Value,
}

/// Cross-agent query result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMemoryQuery {
    pub preferences: Option<Value>,
    pub decisions: Vec<LogRecord>,
    pub errors: Vec<LogRecord>,
    pub discoveries: Vec<LogRecord>,
}

/// Filesystem-backed per-agent log store.
#[derive(Debug, Clone)]
pub struct AgentLogStore {
    layout: StateLayout,
}

impl AgentLogStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn record_decision(
        &self,
        role: &str,
        session_id: Option<&str>,
        payload: Value,
    ) -> MemoryResult<()> {
        self.record(role, LogKind::Decisions, session_id, payload)
    }

    pub fn record_error(
        &self,
        role: &str,
        session_id: Option<&str>,
        payload: Value,
    ) -> MemoryResult<()> {
        self.record(role, LogKind::Errors, session_id, payload)
    }

    pub fn record_discovery(
        &self,
        role: &str,
        session_id: Option<&str>,
        payload: Value,
    ) -> MemoryResult<()> {
        self.record(role, LogKind::Discoveries, session_id, payload)
    }

    fn record(
        &self,
        role: &str,
        kind: LogKind,
        session_id: Option<&str>,
        payload: Value,
    ) -> MemoryResult<()> {
        let record = LogRecord {
            ts: Utc::now(),
            session_id: session_id.map(str::to_string),
            payload,
        };
        append_jsonl(&self.layout.agent_log(role, kind.file_stem()), &record)?;
        Ok(())
    }

    /// Replace the preferences document (single-writer, atomic).
    pub fn set_preferences(&self, role: &str, preferences: Value) -> MemoryResult<()> {
        write_json_atomic(&self.layout.agent_preferences(role), &preferences)?;
        Ok(())
    }

    pub fn preferences(&self, role: &str) -> MemoryResult<Option<Value>> {
        Ok(read_json_or_quarantine(&self.layout.agent_preferences(role))?)
    }

    /// Read one log, optionally only the last `tail` records.
    pub fn read(&self, role: &str, kind: LogKind, tail: Option<usize>) -> MemoryResult<Vec<LogRecord>> {
        let mut records: Vec<LogRecord> =
            read_jsonl(&self.layout.agent_log(role, kind.file_stem()))?;
        if let Some(limit) = tail {
            if records.len() > limit {
                records.drain(..records.len() - limit);
            }
        }
        Ok(records)
    }

    /// Everything another agent may want to know about `role`.
    pub fn query(&self, role: &str, tail: Option<usize>) -> MemoryResult<AgentMemoryQuery> {
        Ok(AgentMemoryQuery {
            preferences: self.preferences(role)?,
            decisions: self.read(role, LogKind::Decisions, tail)?,
            errors: self.read(role, LogKind::Errors, tail)?,
            discoveries: self.read(role, LogKind::Discoveries, tail)?,
        })
    }

    /// Drop records older than `ttl` from every log. Preferences are kept
    /// unconditionally. Returns the number of dropped records.
    pub fn prune(&self, role: &str, ttl: Duration) -> MemoryResult<usize> {
        let cutoff = Utc::now() - ttl;
        let mut dropped = 0usize;

        for kind in [LogKind::Decisions, LogKind::Errors, LogKind::Discoveries] {
            let path = self.layout.agent_log(role, kind.file_stem());
            let records: Vec<LogRecord> = read_jsonl(&path)?;
            if records.is_empty() {
                continue;
            }
            let before = records.len();
            let kept: Vec<LogRecord> =
                records.into_iter().filter(|r| r.ts >= cutoff).collect();
            dropped += before - kept.len();
            if before != kept.len() {
                rewrite_jsonl_atomic(&path, &kept)?;
            }
        }
        Ok(dropped)
    }
}
