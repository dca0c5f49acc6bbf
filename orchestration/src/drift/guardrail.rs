//! Guardrail decisions on top of drift scores.
//!
//! Divergent tool-use gets its plan context re-injected while the per-step
//! refresh budget lasts; the third consecutive divergence on a step is
//! redirected when blocking is enabled. Monitor-level drift optionally
//! warns. Every decision updates the per-session state and the global
//! stats.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::scorer::{DriftScore, PlanStep, ToolIntent};
use super::{DriftLevel, DriftScorer, DriftStore, Prediction, SessionDriftState};
use crate::store::StoreResult;

/// Refreshes allowed per plan step before redirecting.
const REFRESH_BUDGET: u32 = 3;

/// What to do about the intended tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailAction {
    Allow,
    Warn,
    /// Inject the plan-step context back into the agent.
    Refresh,
    /// Block the call.
    Redirect,
}

/// Guardrail policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    pub enabled: bool,
    pub warn_on_monitor: bool,
    pub block_on_divergent: bool,
    pub auto_refresh: bool,
    /// Tools never scored (e.g. planning tools).
    #[serde(default)]
    pub excluded_tools: Vec<String>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warn_on_monitor: true,
            block_on_divergent: true,
            auto_refresh: true,
            excluded_tools: vec!["TodoWrite".to_string()],
        }
    }
}

/// Global guardrail counters (`state/drift-predictions/guardrail-stats.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardrailStats {
    pub allowed: u64,
    pub warned: u64,
    pub refreshed: u64,
    pub redirected: u64,
    pub timeouts: u64,
}

/// A scored and decided tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub action: GuardrailAction,
    pub score: DriftScore,
    /// Plan context to inject when the action is `Refresh`.
    pub refresh_context: Option<String>,
}

/// Scoring plus decision-making, with persistence.
pub struct GuardrailEngine {
    scorer: DriftScorer,
    store: DriftStore,
    config: GuardrailConfig,
}

impl GuardrailEngine {
    pub fn new(scorer: DriftScorer, store: DriftStore, config: GuardrailConfig) -> Self {
        Self {
            scorer,
            store,
            config,
        }
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// Score the intent, record the prediction, and decide.
    pub fn check(
        &self,
        session_id: &str,
        step_index: usize,
        step: &PlanStep,
        intent: &ToolIntent,
    ) -> StoreResult<GuardrailVerdict> {
        if !self.config.enabled || self.config.excluded_tools.iter().any(|t| t == &intent.name) {
            return Ok(GuardrailVerdict {
                action: GuardrailAction::Allow,
                score: self.scorer.score(step, intent),
                refresh_context: None,
            });
        }

        let score = self.scorer.score(step, intent);
        let mut state = self.store.load(session_id)?;
        state.record(Prediction {
            timestamp: Utc::now(),
            score: score.score,
            level: score.level,
            reasons: score.reasons.clone(),
            tool_name: intent.name.clone(),
            plan_step_index: step_index,
        });

        let action = self.decide(&mut state, step_index, score.level);
        if action == GuardrailAction::Redirect {
            state.redirects += 1;
        }
        self.store.save(session_id, &state)?;

        let mut stats = self.store.load_stats()?;
        match action {
            GuardrailAction::Allow => stats.allowed += 1,
            GuardrailAction::Warn => stats.warned += 1,
            GuardrailAction::Refresh => stats.refreshed += 1,
            GuardrailAction::Redirect => stats.redirected += 1,
        }
        self.store.save_stats(&stats)?;

        let refresh_context = match action {
            GuardrailAction::Refresh => Some(refresh_context(step_index, step)),
            _ => None,
        };
        match action {
            GuardrailAction::Redirect => {
                warn!(session_id, tool = intent.name, score = score.score, "tool call redirected")
            }
            GuardrailAction::Refresh => {
                info!(session_id, tool = intent.name, score = score.score, "plan context refreshed")
            }
            _ => {}
        }

        Ok(GuardrailVerdict {
            action,
            score,
            refresh_context,
        })
    }

    fn decide(
        &self,
        state: &mut SessionDriftState,
        step_index: usize,
        level: DriftLevel,
    ) -> GuardrailAction {
        match level {
            DriftLevel::Aligned => GuardrailAction::Allow,
            DriftLevel::Monitor => {
                if self.config.warn_on_monitor {
                    GuardrailAction::Warn
                } else {
                    GuardrailAction::Allow
                }
            }
            DriftLevel::Divergent => {
                // The counter advances on every divergent occurrence; the
                // decision reads the post-increment value, so the refresh
                // budget yields two injections and the third occurrence
                // redirects.
                if self.config.auto_refresh {
                    let n = state.refreshes_per_step.entry(step_index).or_insert(0);
                    *n += 1;
                    if *n < REFRESH_BUDGET {
                        return GuardrailAction::Refresh;
                    }
                }
                if self.config.block_on_divergent {
                    GuardrailAction::Redirect
                } else {
                    GuardrailAction::Warn
                }
            }
        }
    }
}

fn refresh_context(step_index: usize, step: &PlanStep) -> String {
    let mut text = format!(
        "Reminder — current plan step {}: {}\n",
        step_index + 1,
        step.description
    );
    if !step.files.is_empty() {
        text.push_str("Files in scope:\n");
        for file in &step.files {
            text.push_str(&format!("  - {file}\n"));
        }
    }
    text
}
