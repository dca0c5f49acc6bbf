//! Drain protocol — deliver queued actions to the PM agent with back-off.
//!
//! The drain checks PM liveness before each attempt; consecutive failures
//! impose exponential back-off `min(initial * 2^(f-1), max)` so an absent PM
//! is probed gently rather than hammered.

use std::time::Duration;

use tracing::{debug, warn};

use super::queue::{Action, ActionQueue};
use super::QueueResult;

/// Back-off parameters.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Result of one drain attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// An action was handed to the PM.
    Delivered(String),
    /// Queue empty; nothing to do.
    Empty,
    /// PM unavailable; wait this long before the next attempt.
    BackOff(Duration),
}

/// Stateful drain over an [`ActionQueue`].
pub struct QueueDrain {
    queue: ActionQueue,
    config: DrainConfig,
    consecutive_failures: u32,
}

impl QueueDrain {
    pub fn new(queue: ActionQueue, config: DrainConfig) -> Self {
        Self {
            queue,
            config,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// The back-off owed after `failures` consecutive failures.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exp = failures.saturating_sub(1).min(20);
        let backoff = self.config.initial_backoff.saturating_mul(1u32 << exp);
        backoff.min(self.config.max_backoff)
    }

    /// One drain attempt. `pm_available` is probed first; `deliver` is only
    /// invoked with a dequeued action when the PM is reachable.
    pub fn attempt<F, G>(&mut self, pm_available: F, deliver: G) -> QueueResult<DrainOutcome>
    where
        F: FnOnce() -> bool,
        G: FnOnce(&Action) -> bool,
    {
        if !pm_available() {
            self.consecutive_failures += 1;
            let backoff = self.backoff_for(self.consecutive_failures);
            warn!(
                failures = self.consecutive_failures,
                backoff_secs = backoff.as_secs(),
                "PM unavailable, backing off"
            );
            return Ok(DrainOutcome::BackOff(backoff));
        }

        let Some(action) = self.queue.dequeue()? else {
            self.consecutive_failures = 0;
            return Ok(DrainOutcome::Empty);
        };

        if deliver(&action) {
            self.consecutive_failures = 0;
            debug!(id = action.id, "action delivered to PM");
            Ok(DrainOutcome::Delivered(action.id))
        } else {
            // Delivery itself failed: count it and surface the action as
            // failed so it lands in history rather than wedging the queue.
            self.consecutive_failures += 1;
            self.queue.fail(&action.id, "delivery to PM failed")?;
            Ok(DrainOutcome::BackOff(
                self.backoff_for(self.consecutive_failures),
            ))
        }
    }
}
