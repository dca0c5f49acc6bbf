//! Context-pressure tracking and checkpointing.
//!
//! Pressure is a monotone per-session counter pair (tool calls, output
//! bytes) persisted next to the session record. When the byte estimate
//! crosses the auto-checkpoint threshold the agent's progress is gathered
//! without its help and saved as a numbered checkpoint; the PM is nudged at
//! the higher threshold. Restoration turns the latest checkpoint into a
//! resume prompt.

mod checkpoint;
mod tracker;

pub use checkpoint::{gather_context, Checkpoint, CheckpointStore, PlanProgress};
pub use tracker::{PressureAssessment, PressureConfig, PressureCounter, PressureTracker};

/// Sentinel task id under which the PM checkpoints its own state.
pub const PM_SENTINEL_TASK: &str = "pm-orchestrator";

/// Environment variable that marks a session start as a resume.
pub const RESUME_ENV: &str = "PILOT_IS_RESUME";
