//! Registry operations: start, heartbeat, claim, release, end, liveness.
//!
//! Claims are arbitrated by `O_CREAT|O_EXCL` marker files — the filesystem is
//! the lock manager, so two processes racing on the same task need no other
//! coordination. The marker holds the owning session id, letting the loser
//! report who won.

use std::fs::OpenOptions;
use std::io::Write;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use super::types::{LivenessReport, SessionHealth, SessionLock, SessionRecord, SessionStatus};
use super::{SessionError, SessionResult};
use crate::events::{Event, EventLog};
use crate::paths::StateLayout;
use crate::store::{read_json, read_json_or_quarantine, write_json_atomic};
use crate::util::{pid_alive, short_id};

/// Which lock set a request targets.
#[derive(Debug, Clone, Copy)]
enum LockKind {
    Area,
    File,
}

/// Outcome of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Ok,
    /// Task already claimed; carries the owning session id.
    Conflict { owner: String },
}

/// Filesystem-backed session registry.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    layout: StateLayout,
    events: EventLog,
    lease_duration: Duration,
}

impl SessionRegistry {
    pub fn new(layout: StateLayout) -> Self {
        let events = EventLog::new(layout.event_log());
        Self {
            layout,
            events,
            lease_duration: Duration::minutes(15),
        }
    }

    /// Override the lease duration granted on claim/heartbeat.
    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    // -- lifecycle ---------------------------------------------------------

    /// Start a new session: create the record and the PID lockfile, emit
    /// `session_start`.
    pub fn start(
        &self,
        role: &str,
        worktree: Option<std::path::PathBuf>,
    ) -> SessionResult<SessionRecord> {
        let session_id = short_id("sess");
        let record = SessionRecord::new(session_id.clone(), role.to_string(), worktree);
        write_json_atomic(&self.layout.session_record(&session_id), &record)?;

        let lock = SessionLock {
            session_id: session_id.clone(),
            pid: std::process::id(),
            created_at: Utc::now(),
        };
        write_json_atomic(&self.layout.session_lockfile(&session_id), &lock)?;

        self.events.append(&Event::session_start(&session_id, role))?;
        info!(session_id, role, "session started");
        Ok(record)
    }

    /// Refresh the heartbeat and renew the lease.
    pub fn heartbeat(&self, session_id: &str) -> SessionResult<()> {
        let mut record = self.load(session_id)?;
        record.last_heartbeat = Utc::now();
        if record.claimed_task.is_some() {
            record.lease_expires_at = Some(Utc::now() + self.lease_duration);
        }
        write_json_atomic(&self.layout.session_record(session_id), &record)?;
        debug!(session_id, "heartbeat");
        Ok(())
    }

    /// Attempt to claim a task. Exactly one concurrent caller wins.
    pub fn claim(&self, session_id: &str, task_id: &str) -> SessionResult<ClaimOutcome> {
        let mut record = self.load(session_id)?;

        let marker = self.layout.task_claim(task_id);
        if let Some(parent) = marker.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::store::StoreError::io(parent, e))?;
        }

        // O_CREAT|O_EXCL: creation fails if any other session holds the task.
        match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(mut file) => {
                file.write_all(session_id.as_bytes())
                    .map_err(|e| crate::store::StoreError::io(&marker, e))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let owner = std::fs::read_to_string(&marker).unwrap_or_default();
                return Ok(ClaimOutcome::Conflict { owner });
            }
            Err(e) => return Err(crate::store::StoreError::io(&marker, e).into()),
        }

        record.claimed_task = Some(task_id.to_string());
        record.lease_expires_at = Some(Utc::now() + self.lease_duration);
        write_json_atomic(&self.layout.session_record(session_id), &record)?;

        self.events.append(&Event::task_claimed(session_id, task_id))?;
        info!(session_id, task_id, "task claimed");
        Ok(ClaimOutcome::Ok)
    }

    /// Release the session's current claim, if any.
    pub fn release(&self, session_id: &str) -> SessionResult<()> {
        let mut record = self.load(session_id)?;
        let Some(task_id) = record.claimed_task.take() else {
            return Ok(());
        };
        record.lease_expires_at = None;
        write_json_atomic(&self.layout.session_record(session_id), &record)?;

        self.remove_claim_marker(&task_id, session_id);
        self.events.append(&Event::task_released(session_id, &task_id))?;
        info!(session_id, task_id, "task released");
        Ok(())
    }

    /// End a session: release its claim, drop its locks and lockfile.
    pub fn end(&self, session_id: &str, reason: &str) -> SessionResult<()> {
        self.release(session_id)?;

        let mut record = self.load(session_id)?;
        record.status = SessionStatus::Ended;
        record.end_reason = Some(reason.to_string());
        record.locked_areas.clear();
        record.locked_files.clear();
        write_json_atomic(&self.layout.session_record(session_id), &record)?;

        let _ = std::fs::remove_file(self.layout.session_lockfile(session_id));
        self.events.append(&Event::session_end(session_id, reason))?;
        info!(session_id, reason, "session ended");
        Ok(())
    }

    /// Acquire area locks for a session. Fails with `AreaLocked` if any area
    /// overlaps another active session's set (invariant: disjoint).
    pub fn lock_areas(&self, session_id: &str, areas: &[String]) -> SessionResult<()> {
        self.lock_resources(session_id, areas, LockKind::Area)
    }

    /// Acquire file locks for a session, same disjointness rule as areas.
    pub fn lock_files(&self, session_id: &str, files: &[String]) -> SessionResult<()> {
        self.lock_resources(session_id, files, LockKind::File)
    }

    fn lock_resources(
        &self,
        session_id: &str,
        wanted: &[String],
        kind: LockKind,
    ) -> SessionResult<()> {
        let mut record = self.load(session_id)?;

        for other in self.list()? {
            if other.session_id == session_id || other.status.is_terminal() {
                continue;
            }
            let held = match kind {
                LockKind::Area => &other.locked_areas,
                LockKind::File => &other.locked_files,
            };
            if let Some(clash) = wanted.iter().find(|w| held.contains(*w)) {
                return Err(SessionError::AreaLocked {
                    resource: clash.clone(),
                    owner: other.session_id,
                });
            }
        }

        let held = match kind {
            LockKind::Area => &mut record.locked_areas,
            LockKind::File => &mut record.locked_files,
        };
        held.extend(wanted.iter().cloned());
        write_json_atomic(&self.layout.session_record(session_id), &record)?;
        Ok(())
    }

    // -- liveness ----------------------------------------------------------

    /// Is the session's lockfile process still running?
    pub fn is_alive(&self, session_id: &str) -> SessionResult<LivenessReport> {
        let lock: Option<SessionLock> =
            read_json_or_quarantine(&self.layout.session_lockfile(session_id))?;
        let alive = lock.map(|l| pid_alive(l.pid)).unwrap_or(false);
        Ok(LivenessReport {
            alive,
            exit_code: None,
        })
    }

    /// Derive full health for a session (both signals).
    pub fn health(
        &self,
        record: &SessionRecord,
        heartbeat_interval: Duration,
    ) -> SessionResult<SessionHealth> {
        let liveness = self.is_alive(&record.session_id)?;
        Ok(record.health(liveness.alive, heartbeat_interval, Utc::now()))
    }

    // -- PM-side mutations -------------------------------------------------

    /// Supervisor-side cleanup of a dead session: release the task, mark the
    /// record, drop the lockfile. Returns the orphaned task id, if any.
    pub fn reap_dead(&self, session_id: &str) -> SessionResult<Option<String>> {
        let mut record = self.load(session_id)?;
        let task_id = record.claimed_task.take();
        record.status = SessionStatus::Dead;
        record.lease_expires_at = None;
        record.locked_areas.clear();
        record.locked_files.clear();
        write_json_atomic(&self.layout.session_record(session_id), &record)?;

        if let Some(task_id) = &task_id {
            self.remove_claim_marker(task_id, session_id);
            self.events.append(&Event::task_released(session_id, task_id))?;
        }
        let _ = std::fs::remove_file(self.layout.session_lockfile(session_id));
        self.events
            .append(&Event::pm_dead_agent_cleanup(session_id, task_id.as_deref()))?;
        warn!(session_id, ?task_id, "dead session reaped");
        Ok(task_id)
    }

    /// Mark a session stale (record-level; derived health stays the source
    /// of truth for the PM loop).
    pub fn mark_stale(&self, session_id: &str) -> SessionResult<()> {
        let mut record = self.load(session_id)?;
        if !record.status.is_terminal() {
            record.status = SessionStatus::Stale;
            write_json_atomic(&self.layout.session_record(session_id), &record)?;
        }
        Ok(())
    }

    // -- queries -----------------------------------------------------------

    /// Load one record; `UnknownSession` if missing or quarantined.
    pub fn load(&self, session_id: &str) -> SessionResult<SessionRecord> {
        read_json_or_quarantine(&self.layout.session_record(session_id))?
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))
    }

    /// All session records, unordered. Corrupt records are skipped.
    pub fn list(&self) -> SessionResult<Vec<SessionRecord>> {
        let dir = self.layout.sessions_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(crate::store::StoreError::io(&dir, e).into()),
        };

        let mut records = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") || name.ends_with(".pressure.json") {
                continue;
            }
            match read_json::<SessionRecord>(&entry.path()) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(file = name, error = %e, "skipping unreadable session record"),
            }
        }
        Ok(records)
    }

    /// Active (non-terminal) sessions.
    pub fn active(&self) -> SessionResult<Vec<SessionRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| !r.status.is_terminal())
            .collect())
    }

    /// The session currently owning `task_id`, if any.
    pub fn owner_of(&self, task_id: &str) -> SessionResult<Option<SessionRecord>> {
        let now = Utc::now();
        Ok(self.active()?.into_iter().find(|r| {
            r.claimed_task.as_deref() == Some(task_id) && r.owns_claim(now)
        }))
    }

    fn remove_claim_marker(&self, task_id: &str, session_id: &str) {
        let marker = self.layout.task_claim(task_id);
        // Only the owner removes the marker; a mismatch means someone else
        // already re-claimed after a reap.
        match std::fs::read_to_string(&marker) {
            Ok(owner) if owner == session_id => {
                let _ = std::fs::remove_file(&marker);
            }
            Ok(_) | Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn registry(dir: &std::path::Path) -> SessionRegistry {
        SessionRegistry::new(StateLayout::new(dir))
    }

    #[test]
    fn test_start_creates_record_and_lock() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());

        let record = reg.start("frontend", None).unwrap();
        assert_eq!(record.status, SessionStatus::Active);
        assert!(reg.layout.session_record(&record.session_id).exists());
        assert!(reg.layout.session_lockfile(&record.session_id).exists());
        assert!(reg.is_alive(&record.session_id).unwrap().alive);
    }

    #[test]
    fn test_claim_and_conflict() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());

        let a = reg.start("frontend", None).unwrap();
        let b = reg.start("backend", None).unwrap();

        assert_eq!(reg.claim(&a.session_id, "task-7").unwrap(), ClaimOutcome::Ok);
        match reg.claim(&b.session_id, "task-7").unwrap() {
            ClaimOutcome::Conflict { owner } => assert_eq!(owner, a.session_id),
            ClaimOutcome::Ok => panic!("second claim must conflict"),
        }

        // Loser's record never names the task.
        let b_rec = reg.load(&b.session_id).unwrap();
        assert!(b_rec.claimed_task.is_none());
    }

    #[test]
    fn test_release_allows_reclaim() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());

        let a = reg.start("frontend", None).unwrap();
        let b = reg.start("backend", None).unwrap();

        reg.claim(&a.session_id, "task-7").unwrap();
        reg.release(&a.session_id).unwrap();
        assert_eq!(reg.claim(&b.session_id, "task-7").unwrap(), ClaimOutcome::Ok);
    }

    #[test]
    fn test_end_releases_and_removes_lock() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());

        let a = reg.start("frontend", None).unwrap();
        reg.claim(&a.session_id, "task-1").unwrap();
        reg.end(&a.session_id, "finished").unwrap();

        let record = reg.load(&a.session_id).unwrap();
        assert_eq!(record.status, SessionStatus::Ended);
        assert!(record.claimed_task.is_none());
        assert!(!reg.layout.session_lockfile(&a.session_id).exists());
        assert!(!reg.layout.task_claim("task-1").exists());
    }

    #[test]
    fn test_area_locks_disjoint() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());

        let a = reg.start("frontend", None).unwrap();
        let b = reg.start("backend", None).unwrap();

        reg.lock_areas(&a.session_id, &["auth".into(), "ui".into()])
            .unwrap();
        let err = reg
            .lock_areas(&b.session_id, &["db".into(), "auth".into()])
            .unwrap_err();
        assert!(matches!(err, SessionError::AreaLocked { .. }));

        // Disjoint set is fine.
        reg.lock_areas(&b.session_id, &["db".into()]).unwrap();
    }

    #[test]
    fn test_file_locks_disjoint() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());

        let a = reg.start("frontend", None).unwrap();
        let b = reg.start("backend", None).unwrap();

        reg.lock_files(&a.session_id, &["src/auth.rs".into()]).unwrap();
        assert!(reg
            .lock_files(&b.session_id, &["src/auth.rs".into()])
            .is_err());
    }

    #[test]
    fn test_ended_session_does_not_block_locks() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());

        let a = reg.start("frontend", None).unwrap();
        reg.lock_areas(&a.session_id, &["auth".into()]).unwrap();
        reg.end(&a.session_id, "done").unwrap();

        let b = reg.start("backend", None).unwrap();
        reg.lock_areas(&b.session_id, &["auth".into()]).unwrap();
    }

    #[test]
    fn test_reap_dead_orphans_task() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());

        let a = reg.start("frontend", None).unwrap();
        reg.claim(&a.session_id, "task-9").unwrap();

        // Forge a lockfile pointing at a long-gone pid.
        let lock = SessionLock {
            session_id: a.session_id.clone(),
            pid: 99_999_999,
            created_at: Utc::now(),
        };
        write_json_atomic(&reg.layout.session_lockfile(&a.session_id), &lock).unwrap();
        assert!(!reg.is_alive(&a.session_id).unwrap().alive);

        let orphaned = reg.reap_dead(&a.session_id).unwrap();
        assert_eq!(orphaned.as_deref(), Some("task-9"));
        assert!(!reg.layout.task_claim("task-9").exists());
        assert!(!reg.layout.session_lockfile(&a.session_id).exists());
        assert_eq!(reg.load(&a.session_id).unwrap().status, SessionStatus::Dead);

        // Task is re-claimable now.
        let b = reg.start("backend", None).unwrap();
        assert_eq!(reg.claim(&b.session_id, "task-9").unwrap(), ClaimOutcome::Ok);
    }

    #[test]
    fn test_owner_of_ignores_expired_lease() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path()).with_lease_duration(Duration::seconds(-10));

        let a = reg.start("frontend", None).unwrap();
        reg.claim(&a.session_id, "task-3").unwrap();

        // Negative lease expires immediately.
        assert!(reg.owner_of("task-3").unwrap().is_none());
    }

    #[test]
    fn test_unknown_session() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());
        assert!(matches!(
            reg.heartbeat("sess-missing"),
            Err(SessionError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_list_skips_pressure_files() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());
        let a = reg.start("frontend", None).unwrap();

        write_json_atomic(
            &reg.layout.session_pressure(&a.session_id),
            &serde_json::json!({"calls": 1, "bytes": 10, "last_nudge_pct": 0}),
        )
        .unwrap();

        let listed = reg.list().unwrap();
        assert_eq!(listed.len(), 1);
    }
}
