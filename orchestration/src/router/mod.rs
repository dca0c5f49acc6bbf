//! Task router — match a work item to the best available agent role.
//!
//! Each role declares task keywords, file glob patterns and areas; a task is
//! scored against every available role and the best match must clear a
//! confidence gate, otherwise the caller gets the ranked list and a
//! human-readable reason instead of a guess.

mod glob;

pub use glob::glob_matches;

use serde::{Deserialize, Serialize};

/// Weight of each scoring factor.
const KEYWORD_WEIGHT: f64 = 0.35;
const FILE_PATTERN_WEIGHT: f64 = 0.30;
const AREA_WEIGHT: f64 = 0.20;
const AFFINITY_WEIGHT: f64 = 0.15;

/// Keyword hits at which the keyword factor saturates.
const KEYWORD_SATURATION: usize = 3;
/// Area hits at which the area factor saturates.
const AREA_SATURATION: usize = 2;

/// A role's routing profile, from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleProfile {
    pub role: String,
    #[serde(default)]
    pub task_keywords: Vec<String>,
    #[serde(default)]
    pub file_patterns: Vec<String>,
    #[serde(default)]
    pub areas: Vec<String>,
}

/// The routable view of a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl TaskSpec {
    fn text(&self) -> String {
        let mut text = format!("{} {}", self.title, self.description);
        for label in &self.labels {
            text.push(' ');
            text.push_str(label);
        }
        text.to_lowercase()
    }
}

/// A candidate for routing: a role plus its current load.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub profile: RoleProfile,
    /// Tasks this role's sessions currently claim (tie-break input).
    pub claimed_tasks: usize,
    /// Registry affinity bonus in [0,1], when the project registry links
    /// the task's files to this role.
    pub affinity: f64,
}

/// Per-factor breakdown for one scored role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleScore {
    pub role: String,
    pub score: f64,
    pub keyword: f64,
    pub file_pattern: f64,
    pub area: f64,
    pub affinity: f64,
}

/// Routing outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RouteDecision {
    Matched {
        role: String,
        score: f64,
        ranked: Vec<RoleScore>,
    },
    NoMatch {
        ranked: Vec<RoleScore>,
        reason: String,
    },
}

/// Confidence-gated router.
#[derive(Debug, Clone)]
pub struct TaskRouter {
    confidence_threshold: f64,
}

impl Default for TaskRouter {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
        }
    }
}

impl TaskRouter {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Score one role against a task.
    pub fn score(&self, candidate: &Candidate, task: &TaskSpec) -> RoleScore {
        let profile = &candidate.profile;
        let text = task.text();

        let keyword = saturated_hits(
            profile.task_keywords.iter().filter(|k| text.contains(&k.to_lowercase())).count(),
            profile.task_keywords.len(),
            KEYWORD_SATURATION,
        );

        let file_pattern = if task.files.is_empty() || profile.file_patterns.is_empty() {
            0.0
        } else {
            let matched = task
                .files
                .iter()
                .filter(|f| profile.file_patterns.iter().any(|p| glob_matches(p, f)))
                .count();
            matched as f64 / task.files.len() as f64
        };

        let area = saturated_hits(
            profile.areas.iter().filter(|a| text.contains(&a.to_lowercase())).count(),
            profile.areas.len(),
            AREA_SATURATION,
        );

        let affinity = candidate.affinity.clamp(0.0, 1.0);

        let score = KEYWORD_WEIGHT * keyword
            + FILE_PATTERN_WEIGHT * file_pattern
            + AREA_WEIGHT * area
            + AFFINITY_WEIGHT * affinity;

        RoleScore {
            role: profile.role.clone(),
            score,
            keyword,
            file_pattern,
            area,
            affinity,
        }
    }

    /// Pick the best candidate above the confidence threshold.
    ///
    /// Ties break by fewest currently-claimed tasks, then by the stable
    /// ordering of `candidates` (registration order).
    pub fn route(&self, candidates: &[Candidate], task: &TaskSpec) -> RouteDecision {
        let mut ranked: Vec<(usize, RoleScore)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.score(c, task)))
            .collect();

        ranked.sort_by(|(ia, a), (ib, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    candidates[*ia]
                        .claimed_tasks
                        .cmp(&candidates[*ib].claimed_tasks)
                })
                .then(ia.cmp(ib))
        });

        let scores: Vec<RoleScore> = ranked.into_iter().map(|(_, s)| s).collect();

        match scores.first() {
            Some(best) if best.score >= self.confidence_threshold => RouteDecision::Matched {
                role: best.role.clone(),
                score: best.score,
                ranked: scores,
            },
            Some(best) => {
                let reason = format!(
                    "no role cleared confidence {:.2}; best was `{}` at {:.2}",
                    self.confidence_threshold, best.role, best.score
                );
                RouteDecision::NoMatch {
                    ranked: scores,
                    reason,
                }
            }
            None => RouteDecision::NoMatch {
                ranked: Vec::new(),
                reason: "no available agents".to_string(),
            },
        }
    }
}

/// Hit-count factor: saturates to 1.0 at `saturation` hits, otherwise the
/// fraction of the declared list that matched.
fn saturated_hits(hits: usize, declared: usize, saturation: usize) -> f64 {
    if declared == 0 || hits == 0 {
        return 0.0;
    }
    if hits >= saturation {
        return 1.0;
    }
    hits as f64 / declared as f64
}
