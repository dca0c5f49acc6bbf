//! Global append-only event log (`sessions.jsonl`).
//!
//! Every component appends lifecycle events here; it is the only cross-channel
//! ordering surface the system promises. One JSON object per line.

mod types;

pub use types::{Event, EventKind};

use std::path::PathBuf;

use crate::store::{append_jsonl, read_jsonl, read_jsonl_tail, StoreResult};

/// Append-only writer/reader for the global event log.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one event. Failures are surfaced to the caller; the PM tick
    /// logs and continues.
    pub fn append(&self, event: &Event) -> StoreResult<()> {
        append_jsonl(&self.path, event)
    }

    /// All recorded events in append order.
    pub fn read_all(&self) -> StoreResult<Vec<Event>> {
        read_jsonl(&self.path)
    }

    /// The last `limit` events.
    pub fn tail(&self, limit: usize) -> StoreResult<Vec<Event>> {
        read_jsonl_tail(&self.path, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_tail() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("sessions.jsonl"));

        log.append(&Event::session_start("sess-1", "frontend")).unwrap();
        log.append(&Event::task_claimed("sess-1", "task-7")).unwrap();
        log.append(&Event::task_released("sess-1", "task-7")).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 3);
        assert!(matches!(all[0].kind, EventKind::SessionStart { .. }));

        let tail = log.tail(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert!(matches!(tail[1].kind, EventKind::TaskReleased { .. }));
    }

    #[test]
    fn test_serialized_shape_is_flat() {
        let event = Event::task_claimed("sess-9", "task-1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_claimed");
        assert_eq!(json["session_id"], "sess-9");
        assert!(json["ts"].is_string());
    }
}
