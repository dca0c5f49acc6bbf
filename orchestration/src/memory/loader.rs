//! Tiered memory loading.
//!
//! Scores every channel entry against the task context and returns only what
//! clears the relevance threshold, labelled `full` or `summary` so the caller
//! can budget context accordingly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::channels::ChannelStore;
use super::relevance::{MemoryRecord, RelevanceScorer, TaskContext};
use super::MemoryResult;

/// Loaded form of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Full,
    Summary,
}

/// Loading thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadingConfig {
    /// Entries below this relevance are skipped entirely.
    pub relevance_threshold: f64,
    /// Entries at or above this relevance load in full.
    pub full_tier_threshold: f64,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.2,
            full_tier_threshold: 0.6,
        }
    }
}

/// One entry selected for loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedEntry {
    pub channel: String,
    pub tier: Tier,
    pub relevance: f64,
    pub entry: Value,
}

/// Scores all channels and selects the most relevant entries.
pub struct MemoryLoader {
    channels: ChannelStore,
    scorer: RelevanceScorer,
    config: LoadingConfig,
}

impl MemoryLoader {
    pub fn new(channels: ChannelStore, scorer: RelevanceScorer, config: LoadingConfig) -> Self {
        Self {
            channels,
            scorer,
            config,
        }
    }

    /// Score every entry of every channel, filter by the relevance
    /// threshold, tier the survivors and return the top `limit`.
    pub fn relevant_memory(
        &self,
        ctx: &TaskContext,
        limit: usize,
    ) -> MemoryResult<Vec<LoadedEntry>> {
        let mut loaded = Vec::new();

        for channel in self.channels.channel_names()? {
            let Some(envelope) = self.channels.read(&channel)? else {
                continue;
            };
            let records: Vec<MemoryRecord> = envelope
                .entries()
                .into_iter()
                .map(MemoryRecord::from_value)
                .collect();

            for scored in self.scorer.score_batch(&records, ctx, None) {
                if scored.relevance < self.config.relevance_threshold {
                    continue;
                }
                let tier = if scored.relevance >= self.config.full_tier_threshold {
                    Tier::Full
                } else {
                    Tier::Summary
                };
                loaded.push(LoadedEntry {
                    channel: channel.clone(),
                    tier,
                    relevance: scored.relevance,
                    entry: scored.record.raw,
                });
            }
        }

        loaded.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        loaded.truncate(limit);
        Ok(loaded)
    }
}
