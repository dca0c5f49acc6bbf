//! Drift scoring: keyword, path and action-type similarity between the
//! current plan step and an intended tool call.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::lexicon::DriftLexicon;
use super::DriftLevel;

const KEYWORD_WEIGHT: f64 = 0.40;
const PATH_WEIGHT: f64 = 0.35;
const ACTION_WEIGHT: f64 = 0.25;

const ALIGNED_THRESHOLD: f64 = 0.6;
const MONITOR_THRESHOLD: f64 = 0.3;

/// Per-field cap on free-text taken into the keyword set.
const SNIPPET_CAP: usize = 500;

/// The plan step a session is supposed to be executing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// The tool call about to execute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolIntent {
    pub name: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Composite score plus the per-axis breakdown and reasons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftScore {
    pub score: f64,
    pub level: DriftLevel,
    pub keyword: f64,
    pub path: f64,
    pub action: f64,
    pub reasons: Vec<String>,
}

/// The scoring engine. Stateless; heuristics come from the lexicon.
#[derive(Debug, Clone, Default)]
pub struct DriftScorer {
    lexicon: DriftLexicon,
}

impl DriftScorer {
    pub fn new(lexicon: DriftLexicon) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &DriftLexicon {
        &self.lexicon
    }

    /// Score a tool intent against a plan step.
    pub fn score(&self, step: &PlanStep, intent: &ToolIntent) -> DriftScore {
        let keyword = self.keyword_score(step, intent);
        let path = self.path_score(step, intent);

        let plan_action = self.lexicon.plan_intent(&step.description);
        let tool_action = self
            .lexicon
            .tool_category(&intent.name, intent.command.as_deref());
        let action = self.lexicon.alignment(plan_action, tool_action);

        let score = KEYWORD_WEIGHT * keyword + PATH_WEIGHT * path + ACTION_WEIGHT * action;
        let level = if score >= ALIGNED_THRESHOLD {
            DriftLevel::Aligned
        } else if score >= MONITOR_THRESHOLD {
            DriftLevel::Monitor
        } else {
            DriftLevel::Divergent
        };

        let mut reasons = Vec::new();
        if keyword < 0.2 {
            reasons.push("little keyword overlap with the plan step".to_string());
        }
        if path < 0.5 && !step.files.is_empty() && intent.file_path.is_some() {
            reasons.push(format!(
                "target path is outside the step's files: {:?}",
                intent.file_path
            ));
        }
        if action < 0.5 {
            reasons.push(format!(
                "action type {tool_action:?} misaligned with plan intent {plan_action:?}"
            ));
        }

        DriftScore {
            score,
            level,
            keyword,
            path,
            action,
            reasons,
        }
    }

    /// Jaccard over content-word sets.
    fn keyword_score(&self, step: &PlanStep, intent: &ToolIntent) -> f64 {
        let mut plan_text = step.description.clone();
        for file in &step.files {
            plan_text.push(' ');
            plan_text.push_str(basename(file));
        }

        let mut tool_text = intent.name.clone();
        if let Some(path) = &intent.file_path {
            tool_text.push(' ');
            tool_text.push_str(path);
        }
        for field in [&intent.command, &intent.content] {
            if let Some(text) = field {
                tool_text.push(' ');
                tool_text.push_str(&truncated(text, SNIPPET_CAP));
            }
        }

        let plan_words = self.content_words(&plan_text);
        let tool_words = self.content_words(&tool_text);
        if plan_words.is_empty() || tool_words.is_empty() {
            return 0.0;
        }
        let intersection = plan_words.intersection(&tool_words).count() as f64;
        let union = plan_words.union(&tool_words).count() as f64;
        intersection / union
    }

    /// Fuzzy overlap between the step's files and the tool's target paths:
    /// exact basename match 1.0, substring containment 0.5, normalised by
    /// the tool path count.
    fn path_score(&self, step: &PlanStep, intent: &ToolIntent) -> f64 {
        let mut tool_paths: Vec<&str> = Vec::new();
        if let Some(path) = &intent.file_path {
            tool_paths.push(path);
        }
        if tool_paths.is_empty() || step.files.is_empty() {
            // No path evidence either way: neutral.
            return 0.5;
        }

        let mut total = 0.0;
        for tool_path in &tool_paths {
            let tool_base = basename(tool_path).to_lowercase();
            let mut best: f64 = 0.0;
            for step_file in &step.files {
                let step_base = basename(step_file).to_lowercase();
                if tool_base == step_base {
                    best = 1.0;
                    break;
                }
                let tool_lower = tool_path.to_lowercase();
                let step_lower = step_file.to_lowercase();
                if tool_lower.contains(&step_lower) || step_lower.contains(&tool_lower) {
                    best = best.max(0.5);
                }
            }
            total += best;
        }
        total / tool_paths.len() as f64
    }

    fn content_words(&self, text: &str) -> BTreeSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 2)
            .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
            .filter(|w| !self.lexicon.stop_words.iter().any(|s| s == w))
            .map(str::to_string)
            .collect()
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn truncated(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refactor_step() -> PlanStep {
        PlanStep {
            description: "refactor src/auth.js for JWT rotation".into(),
            files: vec!["src/auth.js".into()],
        }
    }

    #[test]
    fn test_aligned_edit_on_plan_file() {
        let scorer = DriftScorer::default();
        let intent = ToolIntent {
            name: "Edit".into(),
            file_path: Some("src/auth.js".into()),
            command: None,
            content: Some("function rotateJwt() { refactor auth token rotation }".into()),
        };
        let score = scorer.score(&refactor_step(), &intent);
        assert_eq!(score.level, DriftLevel::Aligned, "score = {:?}", score);
        assert!(score.path > 0.99);
    }

    #[test]
    fn test_divergent_edit_on_unrelated_file() {
        let scorer = DriftScorer::default();
        let intent = ToolIntent {
            name: "Edit".into(),
            file_path: Some("docs/README.md".into()),
            command: None,
            content: None,
        };
        let score = scorer.score(&refactor_step(), &intent);
        assert!(score.score < 0.3, "score = {}", score.score);
        assert_eq!(score.level, DriftLevel::Divergent);
        assert!(!score.reasons.is_empty());
    }

    #[test]
    fn test_monitor_band() {
        let scorer = DriftScorer::default();
        // Right file, but a read while the plan says write — overlapping
        // keywords only through the path.
        let intent = ToolIntent {
            name: "Bash".into(),
            file_path: None,
            command: Some("cat src/auth.js".into()),
            content: None,
        };
        let score = scorer.score(&refactor_step(), &intent);
        assert!(score.score >= 0.3 && score.score < 0.6, "score = {}", score.score);
        assert_eq!(score.level, DriftLevel::Monitor);
    }

    #[test]
    fn test_path_score_substring_containment() {
        let scorer = DriftScorer::default();
        let step = PlanStep {
            description: "update handlers".into(),
            files: vec!["src/api".into()],
        };
        let intent = ToolIntent {
            name: "Edit".into(),
            file_path: Some("src/api/users.rs".into()),
            ..Default::default()
        };
        let score = scorer.score(&step, &intent);
        assert!((score.path - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_path_evidence_is_neutral() {
        let scorer = DriftScorer::default();
        let step = PlanStep {
            description: "analyze flaky tests".into(),
            files: vec![],
        };
        let intent = ToolIntent {
            name: "Grep".into(),
            ..Default::default()
        };
        let score = scorer.score(&step, &intent);
        assert!((score.path - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snippet_cap() {
        let scorer = DriftScorer::default();
        let mut intent = ToolIntent {
            name: "Write".into(),
            file_path: Some("src/auth.js".into()),
            ..Default::default()
        };
        // A huge payload whose relevant words sit beyond the cap must not
        // change the score vs an empty payload plus junk prefix.
        intent.content = Some(format!("{} refactor jwt rotation", "x".repeat(10_000)));
        let capped = scorer.score(&refactor_step(), &intent);
        intent.content = Some("x".repeat(10_000));
        let junk = scorer.score(&refactor_step(), &intent);
        assert!((capped.score - junk.score).abs() < 1e-9);
    }

    #[test]
    fn test_score_bounds() {
        let scorer = DriftScorer::default();
        let score = scorer.score(&refactor_step(), &ToolIntent::default());
        assert!((0.0..=1.0).contains(&score.score));
    }
}
