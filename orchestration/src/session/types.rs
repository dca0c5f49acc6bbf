//! Session records, lockfiles and health derivation.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stored lifecycle status. `Ended` and `Dead` are terminal and monotone —
/// a record never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
    Stale,
    Dead,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Dead)
    }
}

/// Derived health, computed fresh on every PM tick. Ordering of checks
/// matters: a dead process wins over everything, lease expiry is checked
/// last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionHealth {
    /// Lockfile process is gone.
    Dead,
    /// Heartbeat older than 3x the interval.
    Unresponsive,
    /// Heartbeat older than 2x the interval.
    Stale,
    /// Lease passed; session must be treated as non-owning.
    LeaseExpired,
    Healthy,
}

/// One live (or finished) agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub role: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub claimed_task: Option<String>,
    #[serde(default)]
    pub locked_areas: BTreeSet<String>,
    #[serde(default)]
    pub locked_files: BTreeSet<String>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub worktree_path: Option<PathBuf>,
    #[serde(default)]
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub end_reason: Option<String>,
}

impl SessionRecord {
    pub fn new(session_id: String, role: String, worktree_path: Option<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            role,
            status: SessionStatus::Active,
            claimed_task: None,
            locked_areas: BTreeSet::new(),
            locked_files: BTreeSet::new(),
            last_heartbeat: now,
            lease_expires_at: None,
            worktree_path,
            pid: Some(std::process::id()),
            started_at: now,
            end_reason: None,
        }
    }

    /// Whether this session currently owns its claim. A session whose lease
    /// has expired is treated as non-owning even though the record still
    /// names the task.
    pub fn owns_claim(&self, now: DateTime<Utc>) -> bool {
        if self.claimed_task.is_none() || self.status.is_terminal() {
            return false;
        }
        match self.lease_expires_at {
            Some(expiry) => expiry > now,
            None => true,
        }
    }

    /// Derive health from the two independent liveness signals.
    ///
    /// `lock_alive` is the lockfile check (authoritative for dead);
    /// heartbeat age is authoritative for stale/unresponsive.
    pub fn health(
        &self,
        lock_alive: bool,
        heartbeat_interval: Duration,
        now: DateTime<Utc>,
    ) -> SessionHealth {
        if !lock_alive {
            return SessionHealth::Dead;
        }
        let age = now - self.last_heartbeat;
        if age > heartbeat_interval * 3 {
            return SessionHealth::Unresponsive;
        }
        if age > heartbeat_interval * 2 {
            return SessionHealth::Stale;
        }
        if let Some(expiry) = self.lease_expires_at {
            if expiry < now {
                return SessionHealth::LeaseExpired;
            }
        }
        SessionHealth::Healthy
    }
}

/// Lockfile payload. Existence of this file with a live PID is the
/// authoritative "not dead" signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLock {
    pub session_id: String,
    pub pid: u32,
    pub created_at: DateTime<Utc>,
}

/// Result of an `is_alive` probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessReport {
    pub alive: bool,
    /// Populated when the record has ended and recorded an exit.
    #[serde(default)]
    pub exit_code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord::new("sess-1".into(), "frontend".into(), None)
    }

    #[test]
    fn test_health_dead_wins() {
        let mut rec = record();
        // Even with a fresh heartbeat, a missing lock process means dead.
        rec.last_heartbeat = Utc::now();
        let health = rec.health(false, Duration::seconds(30), Utc::now());
        assert_eq!(health, SessionHealth::Dead);
    }

    #[test]
    fn test_health_ladder() {
        let interval = Duration::seconds(30);
        let now = Utc::now();
        let mut rec = record();

        rec.last_heartbeat = now - Duration::seconds(100);
        assert_eq!(rec.health(true, interval, now), SessionHealth::Unresponsive);

        rec.last_heartbeat = now - Duration::seconds(70);
        assert_eq!(rec.health(true, interval, now), SessionHealth::Stale);

        rec.last_heartbeat = now - Duration::seconds(10);
        assert_eq!(rec.health(true, interval, now), SessionHealth::Healthy);
    }

    #[test]
    fn test_health_lease_expired() {
        let now = Utc::now();
        let mut rec = record();
        rec.last_heartbeat = now;
        rec.lease_expires_at = Some(now - Duration::seconds(1));
        assert_eq!(
            rec.health(true, Duration::seconds(30), now),
            SessionHealth::LeaseExpired
        );
    }

    #[test]
    fn test_owns_claim_respects_lease() {
        let now = Utc::now();
        let mut rec = record();
        assert!(!rec.owns_claim(now));

        rec.claimed_task = Some("task-7".into());
        assert!(rec.owns_claim(now));

        rec.lease_expires_at = Some(now - Duration::seconds(5));
        assert!(!rec.owns_claim(now));

        rec.lease_expires_at = Some(now + Duration::seconds(60));
        assert!(rec.owns_claim(now));

        rec.status = SessionStatus::Dead;
        assert!(!rec.owns_claim(now));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SessionStatus::Ended.is_terminal());
        assert!(SessionStatus::Dead.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
        assert!(!SessionStatus::Stale.is_terminal());
    }
}
