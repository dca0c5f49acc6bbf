//! Session registry — who is alive, what they claim, what they lock.
//!
//! One JSON record per session under `state/sessions/`, plus a PID-bearing
//! lockfile whose existence-and-live-process is the authoritative liveness
//! signal. Task claims are filesystem-exclusive marker files so two sessions
//! racing on the same task resolve without coordination.

mod registry;
mod types;

pub use registry::{ClaimOutcome, SessionRegistry};
pub use types::{
    LivenessReport, SessionHealth, SessionLock, SessionRecord, SessionStatus,
};

use crate::store::StoreError;

/// Error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("task {task_id} already claimed by {owner}")]
    ClaimConflict { task_id: String, owner: String },

    #[error("area or file already locked by {owner}: {resource}")]
    AreaLocked { resource: String, owner: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for registry operations.
pub type SessionResult<T> = Result<T, SessionError>;
