//! Process supervisor — spawn agent processes, capture their output into
//! rotating logs, detect death.
//!
//! Agent stdout/stderr never go anywhere but the per-task log file; each
//! line is timestamped and stream-tagged, each run framed by a header and
//! footer. Log tailers poll rather than watch so they survive rotation.

mod logs;
mod process;
mod tail;

pub use logs::{RotatingLog, MAX_LOG_GENERATIONS, ROTATE_BYTES};
pub use process::{AgentHandle, ProcessSupervisor};
pub use tail::{TailEvent, TailHandle, tail_log};

use std::path::PathBuf;

/// Error type for supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn agent process: {0}")]
    Spawn(String),
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
