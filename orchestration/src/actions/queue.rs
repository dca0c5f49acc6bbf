//! The persistent bounded action queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{QueueError, QueueResult};
use crate::paths::StateLayout;
use crate::store::{
    append_jsonl, read_json_or_quarantine, read_jsonl, rewrite_jsonl_atomic, write_json_atomic,
};
use crate::util::next_id;

/// Maximum queued actions before drop-oldest kicks in.
pub const QUEUE_CAPACITY: usize = 50;

/// History file size that triggers trimming, ~512 KiB.
const HISTORY_SIZE_CAP: u64 = 512 * 1024;

/// Entries kept when the history is trimmed.
const HISTORY_KEEP: usize = 200;

/// What kind of decision the PM agent is being asked to make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CompactRequest,
    DriftAlert,
    AssignTask,
    AgentAssistance,
    SessionCleanup,
    ReviewMerge,
    Custom(String),
}

/// Queue ordering class. `Blocking` drains before `Normal` before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Low,
    Normal,
    Blocking,
}

/// Lifecycle of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Dropped,
}

/// One queued decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub priority: ActionPriority,
    pub data: Value,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Action {
    pub fn new(action_type: ActionType, priority: ActionPriority, data: Value) -> Self {
        let now = Utc::now();
        Self {
            id: next_id("act"),
            action_type,
            priority,
            data,
            status: ActionStatus::Pending,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }
}

/// File-backed queue plus history.
#[derive(Debug, Clone)]
pub struct ActionQueue {
    layout: StateLayout,
}

impl ActionQueue {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// Append an action. Overflow moves the oldest entries to the history
    /// log with `status=dropped`. Returns the action id.
    pub fn enqueue(&self, action: Action) -> QueueResult<String> {
        let id = action.id.clone();
        let mut queue = self.load()?;
        queue.push(action);

        while queue.len() > QUEUE_CAPACITY {
            let mut dropped = queue.remove(0);
            dropped.status = ActionStatus::Dropped;
            dropped.updated_at = Utc::now();
            warn!(id = dropped.id, "action queue overflow, dropping oldest");
            self.append_history(&dropped)?;
        }

        self.persist(&queue)?;
        info!(id, "action enqueued");
        Ok(id)
    }

    /// Take the next pending action: highest priority first, FIFO within a
    /// priority. Its status flips to `processing` in place.
    pub fn dequeue(&self) -> QueueResult<Option<Action>> {
        let mut queue = self.load()?;

        let next = queue
            .iter()
            .enumerate()
            .filter(|(_, a)| a.status == ActionStatus::Pending)
            .max_by(|(ia, a), (ib, b)| {
                a.priority
                    .cmp(&b.priority)
                    // FIFO within a priority: earlier index wins.
                    .then(ib.cmp(ia))
            })
            .map(|(i, _)| i);

        let Some(index) = next else {
            return Ok(None);
        };
        queue[index].status = ActionStatus::Processing;
        queue[index].updated_at = Utc::now();
        let action = queue[index].clone();
        self.persist(&queue)?;
        Ok(Some(action))
    }

    /// Mark an action completed: removed from the queue, appended to history.
    pub fn complete(&self, id: &str, result: Value) -> QueueResult<()> {
        self.finish(id, ActionStatus::Completed, Some(result), None)
    }

    /// Mark an action failed.
    pub fn fail(&self, id: &str, error: &str) -> QueueResult<()> {
        self.finish(id, ActionStatus::Failed, None, Some(error.to_string()))
    }

    fn finish(
        &self,
        id: &str,
        status: ActionStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> QueueResult<()> {
        let mut queue = self.load()?;
        let index = queue
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| QueueError::UnknownAction(id.to_string()))?;

        let mut action = queue.remove(index);
        action.status = status;
        action.result = result;
        action.error = error;
        action.updated_at = Utc::now();
        self.append_history(&action)?;
        self.persist(&queue)?;
        Ok(())
    }

    /// Current queue contents (all statuses).
    pub fn load(&self) -> QueueResult<Vec<Action>> {
        Ok(read_json_or_quarantine(&self.layout.action_queue())?.unwrap_or_default())
    }

    /// Pending entries only.
    pub fn pending(&self) -> QueueResult<Vec<Action>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|a| a.status == ActionStatus::Pending)
            .collect())
    }

    /// Full history, oldest first.
    pub fn history(&self) -> QueueResult<Vec<Action>> {
        Ok(read_jsonl(&self.layout.action_history())?)
    }

    fn persist(&self, queue: &[Action]) -> QueueResult<()> {
        write_json_atomic(&self.layout.action_queue(), &queue)?;
        Ok(())
    }

    fn append_history(&self, action: &Action) -> QueueResult<()> {
        let path = self.layout.action_history();
        append_jsonl(&path, action)?;

        // Size-capped: once the file outgrows the cap, keep the recent tail.
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if size > HISTORY_SIZE_CAP {
            let mut entries: Vec<Action> = read_jsonl(&path)?;
            if entries.len() > HISTORY_KEEP {
                entries.drain(..entries.len() - HISTORY_KEEP);
            }
            rewrite_jsonl_atomic(&path, &entries)?;
            info!(kept = entries.len(), "action history trimmed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn queue(dir: &std::path::Path) -> ActionQueue {
        ActionQueue::new(StateLayout::new(dir))
    }

    fn action(priority: ActionPriority) -> Action {
        Action::new(ActionType::AssignTask, priority, json!({"task": "t"}))
    }

    #[test]
    fn test_enqueue_dequeue_fifo() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path());

        let first = q.enqueue(action(ActionPriority::Normal)).unwrap();
        let second = q.enqueue(action(ActionPriority::Normal)).unwrap();

        let a = q.dequeue().unwrap().unwrap();
        assert_eq!(a.id, first);
        assert_eq!(a.status, ActionStatus::Processing);

        let b = q.dequeue().unwrap().unwrap();
        assert_eq!(b.id, second);

        assert!(q.dequeue().unwrap().is_none());
    }

    #[test]
    fn test_priority_order() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path());

        let low = q.enqueue(action(ActionPriority::Low)).unwrap();
        let normal = q.enqueue(action(ActionPriority::Normal)).unwrap();
        let blocking = q.enqueue(action(ActionPriority::Blocking)).unwrap();

        assert_eq!(q.dequeue().unwrap().unwrap().id, blocking);
        assert_eq!(q.dequeue().unwrap().unwrap().id, normal);
        assert_eq!(q.dequeue().unwrap().unwrap().id, low);
    }

    #[test]
    fn test_complete_moves_to_history() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path());

        let id = q.enqueue(action(ActionPriority::Normal)).unwrap();
        let taken = q.dequeue().unwrap().unwrap();
        q.complete(&taken.id, json!({"ok": true})).unwrap();

        assert!(q.load().unwrap().is_empty());
        let history = q.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, id);
        assert_eq!(history[0].status, ActionStatus::Completed);
        assert_eq!(history[0].result.as_ref().unwrap()["ok"], true);
    }

    #[test]
    fn test_fail_records_error() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path());

        let id = q.enqueue(action(ActionPriority::Normal)).unwrap();
        q.fail(&id, "agent went away").unwrap();

        let history = q.history().unwrap();
        assert_eq!(history[0].status, ActionStatus::Failed);
        assert_eq!(history[0].error.as_deref(), Some("agent went away"));
    }

    #[test]
    fn test_bounded_at_fifty_with_dropped_history() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path());

        let mut ids = Vec::new();
        for _ in 0..55 {
            ids.push(q.enqueue(action(ActionPriority::Normal)).unwrap());
        }

        let queued = q.load().unwrap();
        assert_eq!(queued.len(), QUEUE_CAPACITY);
        // Oldest five went to history as dropped.
        assert_eq!(queued[0].id, ids[5]);

        let history = q.history().unwrap();
        assert_eq!(history.len(), 5);
        assert!(history.iter().all(|a| a.status == ActionStatus::Dropped));
        assert_eq!(history[0].id, ids[0]);
    }

    #[test]
    fn test_history_trims_after_size_cap() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path());

        // Bulky payloads so the cap trips quickly.
        let blob = "x".repeat(4096);
        for _ in 0..300 {
            let a = Action::new(
                ActionType::Custom("bulk".into()),
                ActionPriority::Low,
                json!({"blob": blob}),
            );
            let id = q.enqueue(a).unwrap();
            q.fail(&id, "noop").unwrap();
        }

        let history = q.history().unwrap();
        assert!(history.len() <= 200, "history len = {}", history.len());
    }

    #[test]
    fn test_unknown_action() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path());
        assert!(matches!(
            q.complete("act-nope", json!({})),
            Err(QueueError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_action_type_serialisation() {
        let a = action(ActionPriority::Normal);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "assign_task");
        assert_eq!(json["priority"], "normal");
        assert_eq!(json["status"], "pending");
    }
}
