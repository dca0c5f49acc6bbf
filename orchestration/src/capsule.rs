//! Capsules — the context bundle handed to a spawning agent.
//!
//! A capsule is a markdown document written next to the session record. It
//! names the task, lays the plan out as `Step X of Y` plus checkboxes, and
//! carries resume info and the most relevant shared memory. The checkpoint
//! gatherer later parses plan progress back out of this same document, so
//! the formats here and in the progress parser move together.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::memory::LoadedEntry;
use crate::paths::StateLayout;
use crate::router::TaskSpec;
use crate::store::{write_string_atomic, StoreResult};

/// One step of the approved plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsuleStep {
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub done: bool,
}

/// Everything an agent needs to start (or resume) a task.
#[derive(Debug, Clone, Default)]
pub struct Capsule {
    pub task: TaskSpec,
    pub steps: Vec<CapsuleStep>,
    /// Index of the step the agent should be on, 1-based.
    pub current_step: usize,
    /// Resume prompt from a prior checkpoint, when restarting.
    pub resume: Option<String>,
    /// Relevant memory selected by the tiered loader.
    pub memory: Vec<LoadedEntry>,
    /// Free-form guidance from the PM.
    pub notes: Vec<String>,
}

impl Capsule {
    pub fn new(task: TaskSpec) -> Self {
        Self {
            task,
            current_step: 1,
            ..Default::default()
        }
    }

    pub fn with_steps(mut self, steps: Vec<CapsuleStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_resume(mut self, resume: Option<String>) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_memory(mut self, memory: Vec<LoadedEntry>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.notes.push(note.to_string());
        self
    }

    /// Render the markdown document.
    pub fn render(&self) -> String {
        let mut doc = String::new();
        doc.push_str(&format!("# Task {}\n\n", self.task.task_id));
        doc.push_str(&format!("**{}**\n\n", self.task.title));
        if !self.task.description.is_empty() {
            doc.push_str(&self.task.description);
            doc.push_str("\n\n");
        }
        if !self.task.files.is_empty() {
            doc.push_str("Files in scope:\n");
            for file in &self.task.files {
                doc.push_str(&format!("- {file}\n"));
            }
            doc.push('\n');
        }

        if !self.steps.is_empty() {
            let current = self.current_step.clamp(1, self.steps.len());
            doc.push_str(&format!("## Plan\n\nStep {current} of {}\n\n", self.steps.len()));
            for step in &self.steps {
                let mark = if step.done { "x" } else { " " };
                doc.push_str(&format!("- [{mark}] {}\n", step.description));
                for file in &step.files {
                    doc.push_str(&format!("  - `{file}`\n"));
                }
            }
            doc.push('\n');
        }

        if let Some(resume) = &self.resume {
            doc.push_str("## Resume\n\n");
            doc.push_str(resume);
            if !resume.ends_with('\n') {
                doc.push('\n');
            }
            doc.push('\n');
        }

        if !self.memory.is_empty() {
            doc.push_str("## Shared memory\n\n");
            for entry in &self.memory {
                doc.push_str(&format!(
                    "- [{}] ({:?}, {:.2}) {}\n",
                    entry.channel,
                    entry.tier,
                    entry.relevance,
                    entry
                        .entry
                        .get("text")
                        .or_else(|| entry.entry.get("reason"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("(structured entry)"),
                ));
            }
            doc.push('\n');
        }

        if !self.notes.is_empty() {
            doc.push_str("## Notes\n\n");
            for note in &self.notes {
                doc.push_str(&format!("- {note}\n"));
            }
            doc.push('\n');
        }

        doc.push_str(&format!("_generated {}_\n", Utc::now().format("%Y-%m-%d %H:%M:%S")));
        doc
    }

    /// Write the capsule for a session.
    pub fn write(&self, layout: &StateLayout, session_id: &str) -> StoreResult<()> {
        write_string_atomic(&layout.session_capsule(session_id), &self.render())
    }
}
