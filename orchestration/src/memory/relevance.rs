//! Relevance scoring for memory entries.
//!
//! Four sub-scores in [0,1] — recency (exponential half-life decay),
//! frequency (log-scaled access count), similarity (Jaccard over tags and
//! file basenames) and links — combined by configurable weights into a
//! composite, also clamped to [0,1].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Weights for the composite score. Must sum to ≈ 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RelevanceWeights {
    pub recency: f64,
    pub frequency: f64,
    pub similarity: f64,
    pub links: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            recency: 0.30,
            frequency: 0.25,
            similarity: 0.25,
            links: 0.20,
        }
    }
}

impl RelevanceWeights {
    /// Whether the weights sum to 1 within tolerance.
    pub fn is_normalised(&self) -> bool {
        let sum = self.recency + self.frequency + self.similarity + self.links;
        (sum - 1.0).abs() < 0.01
    }
}

/// Scorer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceConfig {
    #[serde(default)]
    pub weights: RelevanceWeights,
    /// Recency half-life in days.
    pub half_life_days: f64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            weights: RelevanceWeights::default(),
            half_life_days: 7.0,
        }
    }
}

/// The scorable view of a memory entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub link_count: u64,
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
    /// The raw entry, carried along so lifecycle transitions keep payloads.
    #[serde(default)]
    pub raw: Value,
}

impl MemoryRecord {
    /// Extract the scorable fields from a raw channel entry. Unknown or
    /// malformed fields degrade to their zero values rather than failing.
    pub fn from_value(raw: &Value) -> Self {
        let get_strings = |key: &str| -> Vec<String> {
            raw.get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        let get_count = |key: &str| raw.get(key).and_then(Value::as_u64).unwrap_or(0);

        let last_accessed = raw
            .get("last_accessed")
            .or_else(|| raw.get("timestamp"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<DateTime<Utc>>().ok());

        Self {
            id: raw.get("id").and_then(Value::as_str).map(str::to_string),
            tags: get_strings("tags"),
            files: get_strings("files"),
            access_count: get_count("access_count"),
            link_count: get_count("link_count"),
            last_accessed,
            raw: raw.clone(),
        }
    }

    /// Age in fractional days, `None` when the timestamp is missing.
    pub fn age_days(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_accessed
            .map(|ts| (now - ts).num_milliseconds() as f64 / 86_400_000.0)
    }
}

/// Task context entries are scored against.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub tags: Vec<String>,
    pub files: Vec<String>,
}

/// An entry with its composite relevance and per-factor breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub record: MemoryRecord,
    pub relevance: f64,
    pub recency: f64,
    pub frequency: f64,
    pub similarity: f64,
    pub links: f64,
}

/// The scoring engine.
#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    config: RelevanceConfig,
}

impl RelevanceScorer {
    pub fn new(config: RelevanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RelevanceConfig {
        &self.config
    }

    /// Recency: `2^(-age_days / half_life)`. Missing or future-dated
    /// timestamps score 0.
    pub fn score_recency(&self, record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
        match record.age_days(now) {
            Some(age) if age >= 0.0 => (2.0f64).powf(-age / self.config.half_life_days),
            _ => 0.0,
        }
    }

    /// Frequency: `log(1+count) / log(1+max)`, 0 for non-positive inputs.
    pub fn score_frequency(&self, record: &MemoryRecord, max_access_count: u64) -> f64 {
        if record.access_count == 0 || max_access_count == 0 {
            return 0.0;
        }
        let score = ((1 + record.access_count) as f64).ln() / ((1 + max_access_count) as f64).ln();
        score.clamp(0.0, 1.0)
    }

    /// Similarity: Jaccard over lowercased tags and over file basenames,
    /// averaged across the facets both sides actually have.
    pub fn score_similarity(&self, record: &MemoryRecord, ctx: &TaskContext) -> f64 {
        let mut scores = Vec::with_capacity(2);

        if !record.tags.is_empty() && !ctx.tags.is_empty() {
            scores.push(jaccard(
                &lowered_set(&record.tags),
                &lowered_set(&ctx.tags),
            ));
        }
        if !record.files.is_empty() && !ctx.files.is_empty() {
            scores.push(jaccard(
                &basename_set(&record.files),
                &basename_set(&ctx.files),
            ));
        }

        if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        }
    }

    /// Links: `min(1, count / max)`.
    pub fn score_links(&self, record: &MemoryRecord, max_link_count: u64) -> f64 {
        if max_link_count == 0 {
            return 0.0;
        }
        (record.link_count as f64 / max_link_count as f64).min(1.0)
    }

    /// Score one record against a context, with factor maxima from the batch.
    pub fn score(
        &self,
        record: &MemoryRecord,
        ctx: &TaskContext,
        max_access_count: u64,
        max_link_count: u64,
        now: DateTime<Utc>,
    ) -> ScoredEntry {
        let recency = self.score_recency(record, now);
        let frequency = self.score_frequency(record, max_access_count);
        let similarity = self.score_similarity(record, ctx);
        let links = self.score_links(record, max_link_count);

        let w = &self.config.weights;
        let relevance = (w.recency * recency
            + w.frequency * frequency
            + w.similarity * similarity
            + w.links * links)
            .clamp(0.0, 1.0);

        ScoredEntry {
            record: record.clone(),
            relevance,
            recency,
            frequency,
            similarity,
            links,
        }
    }

    /// Score a batch, sorted by relevance descending, optionally limited.
    pub fn score_batch(
        &self,
        records: &[MemoryRecord],
        ctx: &TaskContext,
        limit: Option<usize>,
    ) -> Vec<ScoredEntry> {
        let now = Utc::now();
        let max_access = records.iter().map(|r| r.access_count).max().unwrap_or(0);
        let max_links = records.iter().map(|r| r.link_count).max().unwrap_or(0);

        let mut scored: Vec<ScoredEntry> = records
            .iter()
            .map(|r| self.score(r, ctx, max_access, max_links, now))
            .collect();
        scored.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(limit) = limit {
            scored.truncate(limit);
        }
        scored
    }
}

fn lowered_set(items: &[String]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

fn basename_set(paths: &[String]) -> BTreeSet<String> {
    paths
        .iter()
        .map(|p| {
            p.rsplit('/')
                .next()
                .unwrap_or(p.as_str())
                .to_lowercase()
        })
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}
