//! Drift engine — pre-execution divergence scoring and guardrails.
//!
//! Before a tool runs, its intent is scored against the current plan step on
//! three axes (keyword overlap, path overlap, action-type alignment). The
//! guardrail layer turns the level into an action: allow, warn, refresh the
//! agent's plan context, or redirect (block). Predictions are kept in a ring
//! of the last 50 per session.

mod guardrail;
mod lexicon;
mod scorer;

pub use guardrail::{GuardrailAction, GuardrailConfig, GuardrailEngine, GuardrailStats};
pub use lexicon::{ActionType, DriftLexicon};
pub use scorer::{DriftScore, DriftScorer, PlanStep, ToolIntent};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::paths::StateLayout;
use crate::store::{read_json_or_quarantine, write_json_atomic, StoreResult};

/// Ring capacity for per-session predictions.
pub const PREDICTION_RING: usize = 50;

/// Alignment level derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftLevel {
    Aligned,
    Monitor,
    Divergent,
}

/// One recorded prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    pub level: DriftLevel,
    pub reasons: Vec<String>,
    pub tool_name: String,
    pub plan_step_index: usize,
}

/// Per-session prediction history and counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionDriftState {
    pub predictions: Vec<Prediction>,
    pub total: u64,
    pub aligned: u64,
    pub monitor: u64,
    pub divergent: u64,
    pub redirects: u64,
    /// Refresh count per plan-step index.
    #[serde(default)]
    pub refreshes_per_step: std::collections::BTreeMap<usize, u32>,
}

impl SessionDriftState {
    /// Append a prediction, trimming the ring, and bump the counters.
    pub fn record(&mut self, prediction: Prediction) {
        self.total += 1;
        match prediction.level {
            DriftLevel::Aligned => self.aligned += 1,
            DriftLevel::Monitor => self.monitor += 1,
            DriftLevel::Divergent => self.divergent += 1,
        }
        self.predictions.push(prediction);
        if self.predictions.len() > PREDICTION_RING {
            let excess = self.predictions.len() - PREDICTION_RING;
            self.predictions.drain(..excess);
        }
    }

    /// Consecutive divergent predictions at the tail of the ring.
    pub fn consecutive_divergent(&self) -> usize {
        self.predictions
            .iter()
            .rev()
            .take_while(|p| p.level == DriftLevel::Divergent)
            .count()
    }

    pub fn refreshes_for_step(&self, step: usize) -> u32 {
        self.refreshes_per_step.get(&step).copied().unwrap_or(0)
    }
}

/// Persistence for per-session drift state and global guardrail stats.
#[derive(Debug, Clone)]
pub struct DriftStore {
    layout: StateLayout,
}

impl DriftStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn load(&self, session_id: &str) -> StoreResult<SessionDriftState> {
        Ok(read_json_or_quarantine(&self.layout.drift_predictions(session_id))?
            .unwrap_or_default())
    }

    pub fn save(&self, session_id: &str, state: &SessionDriftState) -> StoreResult<()> {
        write_json_atomic(&self.layout.drift_predictions(session_id), state)
    }

    pub fn load_stats(&self) -> StoreResult<GuardrailStats> {
        Ok(read_json_or_quarantine(&self.layout.guardrail_stats())?.unwrap_or_default())
    }

    pub fn save_stats(&self, stats: &GuardrailStats) -> StoreResult<()> {
        write_json_atomic(&self.layout.guardrail_stats(), stats)
    }
}
