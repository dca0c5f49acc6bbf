//! Entry lifecycle: full → summary → archived.
//!
//! Transitions are pure functions of relevance and age; archiving appends to
//! an append-only log under `memory/archive/<channel>/` and eviction keeps
//! the top slice of the budget by relevance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::relevance::{MemoryRecord, RelevanceScorer, ScoredEntry, TaskContext};
use super::MemoryResult;
use crate::paths::StateLayout;
use crate::store::append_jsonl;

/// Stored entry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Full,
    Summary,
    Archived,
}

impl EntryState {
    pub fn from_value(raw: &Value) -> Self {
        match raw.get("_state").and_then(Value::as_str) {
            Some("summary") => Self::Summary,
            Some("archived") => Self::Archived,
            _ => Self::Full,
        }
    }
}

/// A computed transition for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetTransition {
    Summarize,
    Archive,
}

/// Lifecycle thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Entries below this relevance are candidates for summarisation.
    pub full_threshold: f64,
    pub summary_after_days: f64,
    pub archive_after_days: f64,
    pub min_entries_for_consolidation: usize,
    /// Channel entry budget.
    pub budget: usize,
    /// Eviction fires when count exceeds this percentage of the budget.
    pub eviction_trigger_pct: u32,
    /// Eviction keeps this percentage of the budget, by relevance.
    pub eviction_target_pct: u32,
    /// Maximum length of a summarised text field.
    pub summary_max_len: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            full_threshold: 0.5,
            summary_after_days: 7.0,
            archive_after_days: 30.0,
            min_entries_for_consolidation: 20,
            budget: 50,
            eviction_trigger_pct: 100,
            eviction_target_pct: 75,
            summary_max_len: 200,
        }
    }
}

/// Outcome of a consolidation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub kept: usize,
    pub summarized: usize,
    pub archived: usize,
}

/// Scoring-driven lifecycle engine.
pub struct LifecycleEngine {
    layout: StateLayout,
    scorer: RelevanceScorer,
    config: LifecycleConfig,
}

impl LifecycleEngine {
    pub fn new(layout: StateLayout, scorer: RelevanceScorer, config: LifecycleConfig) -> Self {
        Self {
            layout,
            scorer,
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Compute the transition an entry is due, or `None` to leave it alone.
    pub fn target_state(
        &self,
        entry: &ScoredEntry,
        now: DateTime<Utc>,
    ) -> Option<TargetTransition> {
        let state = EntryState::from_value(&entry.record.raw);
        let age = entry.record.age_days(now)?;

        if age >= self.config.archive_after_days {
            return match state {
                EntryState::Archived => None,
                _ => Some(TargetTransition::Archive),
            };
        }
        if state == EntryState::Full
            && entry.relevance < self.config.full_threshold
            && age >= self.config.summary_after_days
        {
            return Some(TargetTransition::Summarize);
        }
        None
    }

    /// Reduce an entry to its summary form: identity, tags, files and counts
    /// survive; textual fields are concatenated and truncated.
    pub fn summarize(&self, entry: &MemoryRecord) -> Value {
        let mut texts = Vec::new();
        if let Some(obj) = entry.raw.as_object() {
            for key in ["reason", "description", "summary", "detail", "content", "finding"] {
                if let Some(text) = obj.get(key).and_then(Value::as_str) {
                    if !text.is_empty() {
                        texts.push(text);
                    }
                }
            }
        }
        let mut text = texts.join(" | ");
        if text.chars().count() > self.config.summary_max_len {
            text = text
                .chars()
                .take(self.config.summary_max_len.saturating_sub(1))
                .collect::<String>()
                + "…";
        }

        json!({
            "id": entry.id,
            "tags": entry.tags,
            "files": entry.files,
            "access_count": entry.access_count,
            "link_count": entry.link_count,
            "last_accessed": entry.last_accessed,
            "_state": "summary",
            "text": text,
        })
    }

    /// Append an entry to the channel archive, marking its provenance.
    pub fn archive(&self, entry: &MemoryRecord, channel: &str) -> MemoryResult<Value> {
        let mut archived = entry.raw.clone();
        if let Some(obj) = archived.as_object_mut() {
            obj.insert("_state".into(), json!("archived"));
            obj.insert("_source_channel".into(), json!(channel));
            obj.insert("_archived_at".into(), json!(Utc::now()));
        }
        append_jsonl(&self.layout.archive_entries(channel), &archived)?;
        Ok(archived)
    }

    /// Apply `target_state` across a channel's entries. A no-op below the
    /// consolidation minimum. Returns the surviving live entries plus counts.
    pub fn consolidate(
        &self,
        entries: &[Value],
        channel: &str,
        ctx: &TaskContext,
    ) -> MemoryResult<(Vec<Value>, ConsolidationReport)> {
        if entries.len() < self.config.min_entries_for_consolidation {
            return Ok((entries.to_vec(), ConsolidationReport {
                kept: entries.len(),
                ..Default::default()
            }));
        }

        let records: Vec<MemoryRecord> = entries.iter().map(MemoryRecord::from_value).collect();
        let scored = self.scorer.score_batch(&records, ctx, None);
        let now = Utc::now();

        let mut live = Vec::new();
        let mut report = ConsolidationReport::default();
        for entry in &scored {
            match self.target_state(entry, now) {
                Some(TargetTransition::Archive) => {
                    self.archive(&entry.record, channel)?;
                    report.archived += 1;
                }
                Some(TargetTransition::Summarize) => {
                    live.push(self.summarize(&entry.record));
                    report.summarized += 1;
                }
                None => {
                    live.push(entry.record.raw.clone());
                    report.kept += 1;
                }
            }
        }
        info!(
            channel,
            kept = report.kept,
            summarized = report.summarized,
            archived = report.archived,
            "consolidation pass"
        );
        Ok((live, report))
    }

    /// Evict when the channel exceeds `trigger_pct` of its budget: rescore,
    /// keep the top `⌊budget × target_pct⌋` entries, archive the rest.
    pub fn evict(
        &self,
        entries: &[Value],
        channel: &str,
        ctx: &TaskContext,
    ) -> MemoryResult<Vec<Value>> {
        let trigger = self.config.budget * self.config.eviction_trigger_pct as usize / 100;
        if entries.len() <= trigger {
            return Ok(entries.to_vec());
        }

        let keep_count = self.config.budget * self.config.eviction_target_pct as usize / 100;
        let records: Vec<MemoryRecord> = entries.iter().map(MemoryRecord::from_value).collect();
        let scored = self.scorer.score_batch(&records, ctx, None);

        let mut kept = Vec::with_capacity(keep_count);
        for (i, entry) in scored.iter().enumerate() {
            if i < keep_count {
                kept.push(entry.record.raw.clone());
            } else {
                self.archive(&entry.record, channel)?;
            }
        }
        info!(
            channel,
            evicted = entries.len() - kept.len(),
            kept = kept.len(),
            "eviction pass"
        );
        Ok(kept)
    }
}
