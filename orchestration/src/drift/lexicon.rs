//! Heuristic tables for drift scoring, kept as data so deployments can tune
//! them without touching scoring code.

use serde::{Deserialize, Serialize};

/// Plan or tool action category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Write,
    Read,
    Execute,
    Test,
    Unknown,
}

/// Stop-words, intent verbs, tool categories and the alignment table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftLexicon {
    pub stop_words: Vec<String>,
    pub write_verbs: Vec<String>,
    pub read_verbs: Vec<String>,
    pub test_verbs: Vec<String>,
    pub execute_verbs: Vec<String>,
    /// Shell command fragments that mark a Bash call as a test run.
    pub test_commands: Vec<String>,
    /// Shell command fragments that mark a Bash call as a write.
    pub write_commands: Vec<String>,
    /// Shell command fragments that mark a Bash call as a read.
    pub read_commands: Vec<String>,
}

impl Default for DriftLexicon {
    fn default() -> Self {
        let words = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            stop_words: words(&[
                "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has",
                "have", "in", "into", "is", "it", "its", "of", "on", "or", "so", "that", "the",
                "their", "then", "this", "to", "was", "were", "will", "with",
            ]),
            write_verbs: words(&[
                "add", "build", "change", "create", "fix", "implement", "migrate", "modify",
                "refactor", "remove", "rename", "rewrite", "update", "write",
            ]),
            read_verbs: words(&[
                "analyze", "audit", "check", "examine", "explore", "inspect", "read", "review",
                "study", "understand",
            ]),
            test_verbs: words(&["test", "validate", "verify"]),
            execute_verbs: words(&["deploy", "execute", "install", "launch", "run", "start"]),
            test_commands: words(&["cargo test", "pytest", "npm test", "jest", "go test", "vitest"]),
            write_commands: words(&[
                "sed -i", ">>", "> ", "rm ", "mv ", "cp ", "touch ", "mkdir ", "git commit",
                "git add",
            ]),
            read_commands: words(&[
                "cat ", "ls", "grep ", "head ", "tail ", "find ", "git log", "git diff",
                "git status", "wc ",
            ]),
        }
    }
}

impl DriftLexicon {
    /// Infer the plan step's intent from its description verbs. First verb
    /// class hit wins, with test verbs checked before write verbs so
    /// "verify the fix" reads as a test intent.
    pub fn plan_intent(&self, description: &str) -> ActionType {
        let lowered = description.to_lowercase();
        let has = |verbs: &[String]| {
            verbs
                .iter()
                .any(|v| lowered.split(|c: char| !c.is_alphanumeric()).any(|w| w == v))
        };
        if has(&self.test_verbs) {
            ActionType::Test
        } else if has(&self.write_verbs) {
            ActionType::Write
        } else if has(&self.execute_verbs) {
            ActionType::Execute
        } else if has(&self.read_verbs) {
            ActionType::Read
        } else {
            ActionType::Unknown
        }
    }

    /// Categorise a tool call. Bash commands are classified by fragments.
    pub fn tool_category(&self, tool_name: &str, command: Option<&str>) -> ActionType {
        match tool_name {
            "Edit" | "Write" | "MultiEdit" | "NotebookEdit" => ActionType::Write,
            "Read" | "Glob" | "Grep" => ActionType::Read,
            "Bash" => {
                let Some(command) = command else {
                    return ActionType::Execute;
                };
                if self.test_commands.iter().any(|f| command.contains(f.as_str())) {
                    ActionType::Test
                } else if self.write_commands.iter().any(|f| command.contains(f.as_str())) {
                    ActionType::Write
                } else if self.read_commands.iter().any(|f| command.contains(f.as_str())) {
                    ActionType::Read
                } else {
                    ActionType::Execute
                }
            }
            _ => ActionType::Unknown,
        }
    }

    /// Alignment of a tool category with the plan intent, in [0,1].
    pub fn alignment(&self, plan: ActionType, tool: ActionType) -> f64 {
        use ActionType::*;
        match (plan, tool) {
            (a, b) if a == b => 1.0,
            // Unknown on either side is neutral, not damning.
            (Unknown, _) | (_, Unknown) => 0.5,
            (Execute, Test) | (Test, Execute) => 0.75,
            // Reading while planning to write is normal groundwork.
            (Write, Read) => 0.6,
            (Write, Test) | (Test, Write) => 0.4,
            (Write, Execute) | (Execute, Write) => 0.4,
            (Read, Execute) | (Execute, Read) => 0.5,
            (Read, Test) | (Test, Read) => 0.4,
            (Read, Write) => 0.2,
            // Unreachable: all equal-pair cases are already handled by the `a == b` guard above.
            (Write, Write) | (Read, Read) | (Execute, Execute) | (Test, Test) => unreachable!(),
        }
    }
}
