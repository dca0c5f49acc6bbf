//! Per-session pressure counters.
//!
//! Counters are monotone for the life of a session and persist across
//! process restarts; only the explicit checkpoint+compact handshake resets
//! them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::paths::StateLayout;
use crate::store::{read_json_or_quarantine, write_json_atomic, StoreResult};

/// Persisted counter state (`state/sessions/<sid>.pressure.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PressureCounter {
    pub calls: u64,
    pub bytes: u64,
    pub last_nudge_pct: u32,
}

/// Pressure thresholds and capacity estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureConfig {
    /// Estimated context capacity in bytes.
    pub estimated_capacity_bytes: u64,
    /// PM nudge threshold, percent.
    pub nudge_pct: u32,
    /// Agent auto-checkpoint threshold, percent. Below the nudge threshold
    /// so recovery state always exists before the PM intervenes.
    pub auto_checkpoint_pct: u32,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            estimated_capacity_bytes: 800 * 1024,
            nudge_pct: 70,
            auto_checkpoint_pct: 60,
        }
    }
}

/// What the current counters mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureAssessment {
    pub pct: u32,
    /// The agent should checkpoint now.
    pub should_checkpoint: bool,
    /// The PM should be nudged (crossed the threshold since the last nudge).
    pub should_nudge: bool,
}

/// Filesystem-backed pressure tracker.
#[derive(Debug, Clone)]
pub struct PressureTracker {
    layout: StateLayout,
    config: PressureConfig,
}

impl PressureTracker {
    pub fn new(layout: StateLayout, config: PressureConfig) -> Self {
        Self { layout, config }
    }

    pub fn config(&self) -> &PressureConfig {
        &self.config
    }

    /// Load the persisted counters (zeroed when absent or quarantined).
    pub fn load(&self, session_id: &str) -> StoreResult<PressureCounter> {
        Ok(read_json_or_quarantine(&self.layout.session_pressure(session_id))?.unwrap_or_default())
    }

    /// Record one tool call and its output size.
    pub fn record(&self, session_id: &str, output_bytes: u64) -> StoreResult<PressureCounter> {
        let mut counter = self.load(session_id)?;
        counter.calls += 1;
        counter.bytes += output_bytes;
        write_json_atomic(&self.layout.session_pressure(session_id), &counter)?;
        debug!(session_id, calls = counter.calls, bytes = counter.bytes, "pressure recorded");
        Ok(counter)
    }

    /// Percentage of estimated capacity, capped at 100.
    pub fn percentage(&self, counter: &PressureCounter) -> u32 {
        let pct = counter.bytes * 100 / self.config.estimated_capacity_bytes.max(1);
        pct.min(100) as u32
    }

    /// Assess the session's pressure against both thresholds.
    pub fn assess(&self, session_id: &str) -> StoreResult<PressureAssessment> {
        let counter = self.load(session_id)?;
        let pct = self.percentage(&counter);
        Ok(PressureAssessment {
            pct,
            should_checkpoint: pct >= self.config.auto_checkpoint_pct,
            should_nudge: pct >= self.config.nudge_pct && counter.last_nudge_pct < self.config.nudge_pct,
        })
    }

    /// Record that the PM nudged the session at the given percentage so it
    /// is not nudged again until pressure grows past a reset.
    pub fn mark_nudged(&self, session_id: &str, pct: u32) -> StoreResult<()> {
        let mut counter = self.load(session_id)?;
        counter.last_nudge_pct = pct;
        write_json_atomic(&self.layout.session_pressure(session_id), &counter)?;
        Ok(())
    }

    /// Checkpoint+compact handshake: the only path that resets counters.
    pub fn reset(&self, session_id: &str) -> StoreResult<()> {
        write_json_atomic(
            &self.layout.session_pressure(session_id),
            &PressureCounter::default(),
        )?;
        debug!(session_id, "pressure reset after compact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tracker(dir: &std::path::Path) -> PressureTracker {
        PressureTracker::new(StateLayout::new(dir), PressureConfig::default())
    }

    #[test]
    fn test_counters_monotone_and_persistent() {
        let dir = tempdir().unwrap();
        let t = tracker(dir.path());

        t.record("sess-1", 1000).unwrap();
        t.record("sess-1", 2000).unwrap();
        let counter = t.load("sess-1").unwrap();
        assert_eq!(counter.calls, 2);
        assert_eq!(counter.bytes, 3000);

        // A fresh tracker over the same layout sees the same counters.
        let t2 = tracker(dir.path());
        assert_eq!(t2.load("sess-1").unwrap().bytes, 3000);
    }

    #[test]
    fn test_percentage_capped() {
        let dir = tempdir().unwrap();
        let t = tracker(dir.path());
        let counter = PressureCounter {
            calls: 1,
            bytes: 10 * 800 * 1024,
            last_nudge_pct: 0,
        };
        assert_eq!(t.percentage(&counter), 100);
    }

    #[test]
    fn test_auto_checkpoint_at_sixty_percent() {
        let dir = tempdir().unwrap();
        let t = tracker(dir.path());

        // 500_000 of 819_200 bytes = 61%.
        t.record("sess-1", 500_000).unwrap();
        let assessment = t.assess("sess-1").unwrap();
        assert_eq!(assessment.pct, 61);
        assert!(assessment.should_checkpoint);
        assert!(!assessment.should_nudge);
    }

    #[test]
    fn test_nudge_fires_once() {
        let dir = tempdir().unwrap();
        let t = tracker(dir.path());

        t.record("sess-1", 600_000).unwrap(); // 73%
        let first = t.assess("sess-1").unwrap();
        assert!(first.should_nudge);

        t.mark_nudged("sess-1", first.pct).unwrap();
        let second = t.assess("sess-1").unwrap();
        assert!(!second.should_nudge);
        assert!(second.should_checkpoint);
    }

    #[test]
    fn test_reset_clears_counters() {
        let dir = tempdir().unwrap();
        let t = tracker(dir.path());

        t.record("sess-1", 700_000).unwrap();
        t.reset("sess-1").unwrap();
        let counter = t.load("sess-1").unwrap();
        assert_eq!(counter.calls, 0);
        assert_eq!(counter.bytes, 0);
        assert_eq!(t.assess("sess-1").unwrap().pct, 0);
    }
}
