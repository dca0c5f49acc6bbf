//! The PM tick and loop.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use super::review::WorkReview;
use super::tasks::{TaskCache, TaskState};
use crate::actions::{Action, ActionPriority, ActionQueue, ActionType};
use crate::adapters::{Notification, NotificationRouter, Severity};
use crate::config::PilotConfig;
use crate::drift::DriftStore;
use crate::events::{Event, EventLog};
use crate::memory::ChannelStore;
use crate::paths::StateLayout;
use crate::pressure::{Checkpoint, CheckpointStore, PressureTracker, PM_SENTINEL_TASK};
use crate::registry::ProjectRegistry;
use crate::router::{Candidate, RouteDecision, TaskRouter};
use crate::session::{SessionHealth, SessionRecord, SessionRegistry};

/// Pseudo-session id the PM tracks its own pressure under.
const PM_SESSION: &str = "pm-orchestrator";

/// What one tick did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickReport {
    pub sessions_scanned: usize,
    pub healthy: usize,
    pub nudges: usize,
    pub drift_alerts: usize,
    pub assignments: usize,
    pub assists: usize,
    pub stale_cleaned: usize,
    pub dead_cleaned: usize,
    pub reviews_approved: usize,
    pub reviews_rejected: usize,
    pub digest_flushed: bool,
    pub errors: Vec<String>,
}

/// Persisted PM state (`state/orchestrator/pm-state.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PmStateSnapshot {
    pub saved_at: Option<DateTime<Utc>>,
    pub active_sessions: Vec<String>,
    pub queue_pending: usize,
    pub last_digest_flush: Option<DateTime<Utc>>,
    pub last_report: Option<TickReport>,
}

/// The supervisor loop. Holds its collaborators explicitly; everything is
/// reloaded from disk per tick.
pub struct PmLoop {
    layout: StateLayout,
    config: PilotConfig,
    sessions: SessionRegistry,
    channels: ChannelStore,
    pressure: PressureTracker,
    checkpoints: CheckpointStore,
    drift: DriftStore,
    router: TaskRouter,
    projects: ProjectRegistry,
    queue: ActionQueue,
    tasks: TaskCache,
    events: EventLog,
    notifier: NotificationRouter,
}

impl PmLoop {
    pub fn new(layout: StateLayout, config: PilotConfig, notifier: NotificationRouter) -> Self {
        let sessions = SessionRegistry::new(layout.clone())
            .with_lease_duration(ChronoDuration::minutes(config.session.lease_minutes));
        Self {
            sessions,
            channels: ChannelStore::new(layout.clone()),
            pressure: PressureTracker::new(layout.clone(), config.pressure.clone()),
            checkpoints: CheckpointStore::new(layout.clone()),
            drift: DriftStore::new(layout.clone()),
            router: TaskRouter::new(config.confidence_threshold()),
            projects: ProjectRegistry::new(layout.clone()),
            queue: ActionQueue::new(layout.clone()),
            tasks: TaskCache::new(layout.clone()),
            events: EventLog::new(layout.event_log()),
            notifier,
            layout,
            config,
        }
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Run ticks forever at the configured cadence.
    pub async fn run(&self) {
        let interval = std::time::Duration::from_secs(self.config.orchestrator.tick_interval_sec);
        info!(interval_sec = interval.as_secs(), "PM loop started");
        loop {
            // A tick is synchronous filesystem work; keep it off the
            // reactor's async budget.
            let report = tokio::task::block_in_place(|| self.tick());
            if !report.errors.is_empty() {
                warn!(errors = ?report.errors, "tick completed with errors");
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// One full scan. Never returns an error: failures are collected in the
    /// report and the tick always completes.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let mut outbox: Vec<Notification> = Vec::new();
        let mut snapshot = self.load_snapshot();

        // 1. Health for every active session.
        let active = match self.sessions.active() {
            Ok(active) => active,
            Err(e) => {
                report.errors.push(format!("session scan: {e}"));
                Vec::new()
            }
        };
        report.sessions_scanned = active.len();
        let heartbeat = ChronoDuration::seconds(self.config.session.heartbeat_interval_sec as i64);

        for session in &active {
            let health = match self.sessions.health(session, heartbeat) {
                Ok(health) => health,
                Err(e) => {
                    report.errors.push(format!("health {}: {e}", session.session_id));
                    continue;
                }
            };

            match health {
                SessionHealth::Healthy | SessionHealth::LeaseExpired => {
                    report.healthy += 1;
                    // 2. Pressure.
                    self.check_pressure(session, &mut report, &mut outbox);
                    // 3. Drift.
                    self.check_drift(session, &mut report, &mut outbox);
                    // 6. Work review for finished plans.
                    self.maybe_review(session, &mut report, &mut outbox);
                }
                SessionHealth::Stale | SessionHealth::Unresponsive => {
                    // 5a. Stale cleanup under policy.
                    if self.config.orchestrator.auto_reassign_stale {
                        self.clean_stale(session, &mut report, &mut outbox);
                    }
                }
                SessionHealth::Dead => {
                    // 5b. Dead cleanup is unconditional.
                    self.clean_dead(session, &mut report, &mut outbox);
                }
            }
        }

        // 4. Route unowned tasks.
        self.route_open_tasks(&mut report, &mut outbox);

        // 7. Self-checkpoint under pressure.
        self.self_checkpoint(&mut report, &snapshot);

        // 8. Digest flush on its interval.
        let digest_due = snapshot
            .last_digest_flush
            .map(|last| {
                Utc::now() - last
                    >= ChronoDuration::minutes(
                        self.config.notifications.digest_interval_minutes as i64,
                    )
            })
            .unwrap_or(true);
        if digest_due {
            self.notifier.flush_digest();
            snapshot.last_digest_flush = Some(Utc::now());
            report.digest_flushed = true;
        }

        // All external I/O (notifications) happens after the mutations.
        for notification in outbox {
            self.notifier.notify(notification);
        }

        snapshot.saved_at = Some(Utc::now());
        snapshot.active_sessions = active.iter().map(|s| s.session_id.clone()).collect();
        snapshot.queue_pending = self.queue.pending().map(|p| p.len()).unwrap_or(0);
        snapshot.last_report = Some(report.clone());
        if let Err(e) = crate::store::write_json_atomic(&self.layout.pm_state(), &snapshot) {
            report.errors.push(format!("pm state: {e}"));
        }

        report
    }

    // -- tick steps ---------------------------------------------------------

    fn check_pressure(
        &self,
        session: &SessionRecord,
        report: &mut TickReport,
        outbox: &mut Vec<Notification>,
    ) {
        let assessment = match self.pressure.assess(&session.session_id) {
            Ok(assessment) => assessment,
            Err(e) => {
                report.errors.push(format!("pressure {}: {e}", session.session_id));
                return;
            }
        };
        if !assessment.should_nudge {
            return;
        }
        if self.has_pending(&ActionType::CompactRequest, &session.session_id) {
            return;
        }

        let action = Action::new(
            ActionType::CompactRequest,
            ActionPriority::Normal,
            json!({
                "session_id": session.session_id,
                "pressure_pct": assessment.pct,
            }),
        );
        if let Err(e) = self.queue.enqueue(action) {
            report.errors.push(format!("enqueue compact: {e}"));
            return;
        }
        if let Err(e) = self.pressure.mark_nudged(&session.session_id, assessment.pct) {
            report.errors.push(format!("mark nudged: {e}"));
        }
        outbox.push(
            Notification::new(
                "context pressure",
                &format!(
                    "session {} at {}% of its context budget",
                    session.session_id, assessment.pct
                ),
                Severity::Warning,
            )
            .with_event("compact_request"),
        );
        report.nudges += 1;
    }

    fn check_drift(
        &self,
        session: &SessionRecord,
        report: &mut TickReport,
        outbox: &mut Vec<Notification>,
    ) {
        let state = match self.drift.load(&session.session_id) {
            Ok(state) => state,
            Err(e) => {
                report.errors.push(format!("drift {}: {e}", session.session_id));
                return;
            }
        };
        let streak = state.consecutive_divergent();
        if streak < self.config.orchestrator.drift_threshold {
            return;
        }
        if self.has_pending(&ActionType::DriftAlert, &session.session_id) {
            return;
        }

        let action = Action::new(
            ActionType::DriftAlert,
            ActionPriority::Blocking,
            json!({
                "session_id": session.session_id,
                "consecutive_divergent": streak,
                "recent": state.predictions.iter().rev().take(5).collect::<Vec<_>>(),
            }),
        );
        if let Err(e) = self.queue.enqueue(action) {
            report.errors.push(format!("enqueue drift alert: {e}"));
            return;
        }
        let _ = self.events.append(&Event::pm_agent_blocked(
            &session.session_id,
            &format!("{streak} consecutive divergent tool calls"),
        ));
        outbox.push(
            Notification::new(
                "drift alert",
                &format!(
                    "session {} diverged from its plan {} times in a row",
                    session.session_id, streak
                ),
                Severity::Warning,
            )
            .with_event("drift_alert"),
        );
        report.drift_alerts += 1;
    }

    fn route_open_tasks(&self, report: &mut TickReport, outbox: &mut Vec<Notification>) {
        let open = match self.tasks.open_tasks() {
            Ok(open) => open,
            Err(e) => {
                report.errors.push(format!("task cache: {e}"));
                return;
            }
        };
        if open.is_empty() {
            return;
        }

        let active = self.sessions.active().unwrap_or_default();
        // Pool cap: with every slot busy there is nobody to assign to, so
        // defer routing rather than queue assignments that cannot start.
        let busy = active.iter().filter(|s| s.claimed_task.is_some()).count();
        if busy >= self.config.session.max_concurrent_sessions {
            warn!(busy, cap = self.config.session.max_concurrent_sessions, "session pool full, deferring routing");
            return;
        }
        let candidates: Vec<Candidate> = self
            .config
            .roles
            .iter()
            .map(|profile| {
                let claimed = active
                    .iter()
                    .filter(|s| s.role == profile.role && s.claimed_task.is_some())
                    .count();
                Candidate {
                    profile: profile.clone(),
                    claimed_tasks: claimed,
                    affinity: 0.0,
                }
            })
            .collect();

        for task in open {
            match self.sessions.owner_of(&task.spec.task_id) {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    report.errors.push(format!("owner of {}: {e}", task.spec.task_id));
                    continue;
                }
            }
            if self.has_pending_task(&task.spec.task_id) {
                continue;
            }

            // Affinity needs the task's files, so it is filled per task.
            let mut candidates = candidates.clone();
            for candidate in &mut candidates {
                candidate.affinity = self
                    .projects
                    .affinity(&candidate.profile.role, &task.spec.files)
                    .unwrap_or(0.0);
            }

            match self.router.route(&candidates, &task.spec) {
                RouteDecision::Matched { role, score, ranked } => {
                    let idle = active.iter().find(|s| s.role == role && s.claimed_task.is_none());
                    let action = Action::new(
                        ActionType::AssignTask,
                        ActionPriority::Normal,
                        json!({
                            "task_id": task.spec.task_id,
                            "role": role,
                            "score": score,
                            "session_id": idle.map(|s| s.session_id.clone()),
                            "ranked": ranked,
                        }),
                    );
                    if let Err(e) = self.queue.enqueue(action) {
                        report.errors.push(format!("enqueue assign: {e}"));
                        continue;
                    }
                    if let Some(session) = idle {
                        let _ = self.events.append(&Event::pm_task_assigned(
                            &session.session_id,
                            &task.spec.task_id,
                            score,
                        ));
                    }
                    outbox.push(
                        Notification::new(
                            "task routed",
                            &format!("{} -> {role} ({score:.2})", task.spec.task_id),
                            Severity::Info,
                        )
                        .with_event("assign_task"),
                    );
                    report.assignments += 1;
                }
                RouteDecision::NoMatch { ranked, reason } => {
                    let action = Action::new(
                        ActionType::AgentAssistance,
                        ActionPriority::Normal,
                        json!({
                            "task_id": task.spec.task_id,
                            "reason": reason,
                            "ranked": ranked,
                        }),
                    );
                    if let Err(e) = self.queue.enqueue(action) {
                        report.errors.push(format!("enqueue assistance: {e}"));
                        continue;
                    }
                    report.assists += 1;
                }
            }
        }
    }

    fn clean_stale(
        &self,
        session: &SessionRecord,
        report: &mut TickReport,
        outbox: &mut Vec<Notification>,
    ) {
        if self.has_pending(&ActionType::SessionCleanup, &session.session_id) {
            return;
        }
        let task_id = session.claimed_task.clone();
        if let Err(e) = self.sessions.release(&session.session_id) {
            report.errors.push(format!("release stale {}: {e}", session.session_id));
            return;
        }
        if let Err(e) = self.sessions.mark_stale(&session.session_id) {
            report.errors.push(format!("mark stale {}: {e}", session.session_id));
        }
        let _ = self
            .events
            .append(&Event::pm_stale_cleanup(&session.session_id, task_id.as_deref()));

        let action = Action::new(
            ActionType::SessionCleanup,
            ActionPriority::Normal,
            json!({
                "session_id": session.session_id,
                "reason": "stale",
                "orphaned_task": task_id,
            }),
        );
        if let Err(e) = self.queue.enqueue(action) {
            report.errors.push(format!("enqueue stale cleanup: {e}"));
        }
        outbox.push(
            Notification::new(
                "stale agent",
                &format!("session {} stopped heartbeating; task released", session.session_id),
                Severity::Warning,
            )
            .with_event("session_cleanup"),
        );
        report.stale_cleaned += 1;
    }

    fn clean_dead(
        &self,
        session: &SessionRecord,
        report: &mut TickReport,
        outbox: &mut Vec<Notification>,
    ) {
        let orphaned = match self.sessions.reap_dead(&session.session_id) {
            Ok(orphaned) => orphaned,
            Err(e) => {
                report.errors.push(format!("reap {}: {e}", session.session_id));
                return;
            }
        };

        let action = Action::new(
            ActionType::SessionCleanup,
            ActionPriority::Blocking,
            json!({
                "session_id": session.session_id,
                "reason": "dead",
                "orphaned_task": orphaned,
            }),
        );
        if let Err(e) = self.queue.enqueue(action) {
            report.errors.push(format!("enqueue dead cleanup: {e}"));
        }
        outbox.push(
            Notification::new(
                "dead agent",
                &format!(
                    "session {} process is gone{}",
                    session.session_id,
                    orphaned
                        .as_deref()
                        .map(|t| format!("; task {t} orphaned"))
                        .unwrap_or_default()
                ),
                Severity::Critical,
            )
            .with_event("session_cleanup"),
        );
        report.dead_cleaned += 1;
    }

    fn maybe_review(
        &self,
        session: &SessionRecord,
        report: &mut TickReport,
        outbox: &mut Vec<Notification>,
    ) {
        let Some(task_id) = session.claimed_task.clone() else {
            return;
        };
        let checkpoint = match self.checkpoints.load_latest(&session.session_id) {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => return,
            Err(e) => {
                report.errors.push(format!("checkpoint {}: {e}", session.session_id));
                return;
            }
        };
        if checkpoint.total_steps == 0 || checkpoint.plan_step < checkpoint.total_steps {
            return;
        }
        if self.has_pending(&ActionType::ReviewMerge, &session.session_id)
            || self.has_pending_task(&task_id)
        {
            return;
        }

        let drift = self.drift.load(&session.session_id).unwrap_or_default();
        let review = WorkReview::new(
            self.config.orchestrator.require_tests_pass,
            self.config.orchestrator.test_command.clone(),
        );
        let outcome = review.evaluate(&checkpoint, &drift, session.worktree_path.as_deref());

        if outcome.approved {
            let action = Action::new(
                ActionType::ReviewMerge,
                ActionPriority::Normal,
                json!({
                    "session_id": session.session_id,
                    "task_id": task_id,
                    "worktree": session.worktree_path,
                }),
            );
            if let Err(e) = self.queue.enqueue(action) {
                report.errors.push(format!("enqueue merge: {e}"));
                return;
            }
            let _ = self
                .events
                .append(&Event::pm_merge_approved(&session.session_id, &task_id));
            let _ = self.tasks.set_state(&task_id, TaskState::Done);
            outbox.push(
                Notification::new(
                    "merge approved",
                    &format!("{task_id} passed review, merge queued"),
                    Severity::Info,
                )
                .with_event("review_merge"),
            );
            report.reviews_approved += 1;
        } else {
            let action = Action::new(
                ActionType::AgentAssistance,
                ActionPriority::Normal,
                json!({
                    "session_id": session.session_id,
                    "task_id": task_id,
                    "review_feedback": outcome.reasons,
                }),
            );
            if let Err(e) = self.queue.enqueue(action) {
                report.errors.push(format!("enqueue review feedback: {e}"));
                return;
            }
            let _ = self.events.append(&Event::pm_agent_blocked(
                &session.session_id,
                &outcome.reasons.join("; "),
            ));
            report.reviews_rejected += 1;
        }
    }

    fn self_checkpoint(&self, report: &mut TickReport, snapshot: &PmStateSnapshot) {
        // The PM's own pressure grows with the state it carries per tick.
        let tick_bytes = serde_json::to_vec(snapshot).map(|b| b.len() as u64).unwrap_or(256);
        if let Err(e) = self.pressure.record(PM_SESSION, tick_bytes) {
            report.errors.push(format!("pm pressure: {e}"));
            return;
        }
        let assessment = match self.pressure.assess(PM_SESSION) {
            Ok(assessment) => assessment,
            Err(e) => {
                report.errors.push(format!("pm pressure assess: {e}"));
                return;
            }
        };
        if !assessment.should_nudge {
            return;
        }

        let checkpoint = Checkpoint {
            version: 0,
            task_id: Some(PM_SENTINEL_TASK.to_string()),
            task_title: Some("orchestrator state".to_string()),
            plan_step: 0,
            total_steps: 0,
            completed_steps: Vec::new(),
            files_modified: Vec::new(),
            current_context: format!(
                "{} active sessions, {} pending actions",
                snapshot.active_sessions.len(),
                snapshot.queue_pending
            ),
            key_decisions: Vec::new(),
            important_findings: Vec::new(),
            saved_at: Utc::now(),
        };
        match self.checkpoints.save(PM_SESSION, checkpoint) {
            Ok(saved) => {
                info!(version = saved.version, "PM self-checkpoint");
                if let Err(e) = self.pressure.reset(PM_SESSION) {
                    report.errors.push(format!("pm pressure reset: {e}"));
                }
            }
            Err(e) => {
                error!(error = %e, "PM self-checkpoint failed");
                report.errors.push(format!("pm checkpoint: {e}"));
            }
        }
    }

    // -- helpers ------------------------------------------------------------

    fn load_snapshot(&self) -> PmStateSnapshot {
        crate::store::read_json_or_quarantine(&self.layout.pm_state())
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    fn has_pending(&self, action_type: &ActionType, session_id: &str) -> bool {
        self.queue
            .pending()
            .map(|pending| {
                pending.iter().any(|a| {
                    &a.action_type == action_type
                        && a.data.get("session_id").and_then(|v| v.as_str()) == Some(session_id)
                })
            })
            .unwrap_or(false)
    }

    fn has_pending_task(&self, task_id: &str) -> bool {
        self.queue
            .pending()
            .map(|pending| {
                pending
                    .iter()
                    .any(|a| a.data.get("task_id").and_then(|v| v.as_str()) == Some(task_id))
            })
            .unwrap_or(false)
    }

    /// Channel store accessor for callers composing richer PM prompts.
    pub fn channels(&self) -> &ChannelStore {
        &self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LogChannel, NotificationChannel};
    use crate::pm::CachedTask;
    use crate::router::{RoleProfile, TaskSpec};
    use crate::session::SessionLock;
    use crate::store::write_json_atomic;
    use tempfile::tempdir;

    fn pm(dir: &std::path::Path, config: PilotConfig) -> PmLoop {
        let channels: Vec<Box<dyn NotificationChannel>> = vec![Box::new(LogChannel)];
        let notifier = NotificationRouter::new(channels, "log");
        PmLoop::new(StateLayout::new(dir), config, notifier)
    }

    fn config_with_frontend() -> PilotConfig {
        let mut config = PilotConfig::defaults();
        config.roles = vec![RoleProfile {
            role: "frontend".into(),
            task_keywords: vec!["ui".into(), "component".into(), "css".into()],
            file_patterns: vec!["src/components/**".into()],
            areas: vec!["login".into()],
        }];
        config
    }

    #[test]
    fn test_empty_tick_is_clean() {
        let dir = tempdir().unwrap();
        let pm = pm(dir.path(), PilotConfig::defaults());
        let report = pm.tick();
        assert_eq!(report.sessions_scanned, 0);
        assert!(report.errors.is_empty());
        // Snapshot written.
        assert!(pm.layout.pm_state().exists());
    }

    #[test]
    fn test_dead_session_cleanup_and_requeue() {
        let dir = tempdir().unwrap();
        let pm = pm(dir.path(), config_with_frontend());

        let session = pm.sessions.start("frontend", None).unwrap();
        pm.sessions.claim(&session.session_id, "task-7").unwrap();

        // Replace the lockfile with a long-gone pid.
        let lock = SessionLock {
            session_id: session.session_id.clone(),
            pid: 99_999_999,
            created_at: Utc::now(),
        };
        write_json_atomic(
            &pm.layout.session_lockfile(&session.session_id),
            &lock,
        )
        .unwrap();

        let report = pm.tick();
        assert_eq!(report.dead_cleaned, 1);

        // The cleanup action is queued with the orphaned task.
        let pending = pm.queue.pending().unwrap();
        let cleanup = pending
            .iter()
            .find(|a| a.action_type == ActionType::SessionCleanup)
            .unwrap();
        assert_eq!(cleanup.data["orphaned_task"], "task-7");
        assert_eq!(cleanup.priority, ActionPriority::Blocking);

        // Next tick: the task is claimable again by a fresh session.
        let replacement = pm.sessions.start("frontend", None).unwrap();
        assert_eq!(
            pm.sessions.claim(&replacement.session_id, "task-7").unwrap(),
            crate::session::ClaimOutcome::Ok
        );
    }

    #[test]
    fn test_pressure_nudge_enqueued_once() {
        let dir = tempdir().unwrap();
        let pm = pm(dir.path(), config_with_frontend());

        let session = pm.sessions.start("frontend", None).unwrap();
        // 73% of the default 800 KiB capacity.
        pm.pressure.record(&session.session_id, 600_000).unwrap();

        let report = pm.tick();
        assert_eq!(report.nudges, 1);
        let report = pm.tick();
        assert_eq!(report.nudges, 0, "second tick must not re-nudge");

        let pending = pm.queue.pending().unwrap();
        let nudges = pending
            .iter()
            .filter(|a| a.action_type == ActionType::CompactRequest)
            .count();
        assert_eq!(nudges, 1);
    }

    #[test]
    fn test_open_task_routed_to_frontend() {
        let dir = tempdir().unwrap();
        let pm = pm(dir.path(), config_with_frontend());

        pm.tasks
            .save(&[CachedTask {
                spec: TaskSpec {
                    task_id: "task-login".into(),
                    title: "fix login button padding".into(),
                    description: "login button css is off".into(),
                    labels: vec!["ui".into()],
                    files: vec!["src/components/Login.tsx".into()],
                },
                state: TaskState::Open,
            }])
            .unwrap();

        let report = pm.tick();
        assert_eq!(report.assignments, 1);

        let pending = pm.queue.pending().unwrap();
        let assign = pending
            .iter()
            .find(|a| a.action_type == ActionType::AssignTask)
            .unwrap();
        assert_eq!(assign.data["role"], "frontend");
        assert_eq!(assign.data["task_id"], "task-login");

        // Re-ticking does not duplicate the assignment.
        let report = pm.tick();
        assert_eq!(report.assignments, 0);
    }

    #[test]
    fn test_unroutable_task_gets_assistance() {
        let dir = tempdir().unwrap();
        let pm = pm(dir.path(), config_with_frontend());

        pm.tasks
            .save(&[CachedTask {
                spec: TaskSpec {
                    task_id: "task-docs".into(),
                    title: "update changelog".into(),
                    ..Default::default()
                },
                state: TaskState::Open,
            }])
            .unwrap();

        let report = pm.tick();
        assert_eq!(report.assignments, 0);
        assert_eq!(report.assists, 1);

        let pending = pm.queue.pending().unwrap();
        let assist = pending
            .iter()
            .find(|a| a.action_type == ActionType::AgentAssistance)
            .unwrap();
        assert!(assist.data["reason"].as_str().unwrap().contains("confidence"));
    }

    #[test]
    fn test_completed_plan_reviewed_and_merge_queued() {
        let dir = tempdir().unwrap();
        let pm = pm(dir.path(), config_with_frontend());

        let session = pm.sessions.start("frontend", None).unwrap();
        pm.sessions.claim(&session.session_id, "task-9").unwrap();
        pm.tasks
            .save(&[CachedTask {
                spec: TaskSpec {
                    task_id: "task-9".into(),
                    title: "ship it".into(),
                    ..Default::default()
                },
                state: TaskState::InProgress,
            }])
            .unwrap();

        let checkpoint = Checkpoint {
            version: 0,
            task_id: Some("task-9".into()),
            task_title: None,
            plan_step: 3,
            total_steps: 3,
            completed_steps: vec![],
            files_modified: vec![],
            current_context: "done".into(),
            key_decisions: vec![],
            important_findings: vec![],
            saved_at: Utc::now(),
        };
        pm.checkpoints.save(&session.session_id, checkpoint).unwrap();

        let report = pm.tick();
        assert_eq!(report.reviews_approved, 1);

        let pending = pm.queue.pending().unwrap();
        assert!(pending
            .iter()
            .any(|a| a.action_type == ActionType::ReviewMerge));
        assert_eq!(
            pm.tasks.get("task-9").unwrap().unwrap().state,
            TaskState::Done
        );
    }

    #[test]
    fn test_digest_flush_marked() {
        let dir = tempdir().unwrap();
        let pm = pm(dir.path(), PilotConfig::defaults());
        // First tick has no recorded flush, so it flushes.
        let report = pm.tick();
        assert!(report.digest_flushed);
        // Immediately after, the interval has not elapsed.
        let report = pm.tick();
        assert!(!report.digest_flushed);
    }
}
