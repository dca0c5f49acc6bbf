//! Action queue — the persistent bridge from detected conditions to PM
//! decisions.
//!
//! Single writer (the PM loop) and single reader (the PM agent's prompt
//! cycle) over one JSON array, bounded at 50 entries with drop-oldest
//! overflow into a size-capped history log. A drain loop with exponential
//! back-off retries while the PM agent is unavailable.

mod drain;
mod queue;

pub use drain::{DrainConfig, DrainOutcome, QueueDrain};
pub use queue::{Action, ActionPriority, ActionQueue, ActionStatus, ActionType, QUEUE_CAPACITY};

use crate::store::StoreError;

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("unknown action id: {0}")]
    UnknownAction(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
