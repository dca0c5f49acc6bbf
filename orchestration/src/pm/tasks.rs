//! Local cache of the external task tracker.
//!
//! The tracker is the source of truth; the orchestrator caches just enough
//! to route and review. A deployment-specific sync process refreshes the
//! cache file; the PM only reads it (and advances status as work lands).

use serde::{Deserialize, Serialize};

use crate::paths::StateLayout;
use crate::router::TaskSpec;
use crate::store::{read_json_or_quarantine, write_json_atomic, StoreResult};

/// Where a cached task stands, from the orchestrator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Open,
    InProgress,
    Done,
    Merged,
}

/// One cached tracker row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTask {
    #[serde(flatten)]
    pub spec: TaskSpec,
    pub state: TaskState,
}

/// Read/write access to the cache file.
#[derive(Debug, Clone)]
pub struct TaskCache {
    layout: StateLayout,
}

impl TaskCache {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn list(&self) -> StoreResult<Vec<CachedTask>> {
        Ok(read_json_or_quarantine(&self.layout.task_cache())?.unwrap_or_default())
    }

    pub fn save(&self, tasks: &[CachedTask]) -> StoreResult<()> {
        write_json_atomic(&self.layout.task_cache(), &tasks)
    }

    pub fn get(&self, task_id: &str) -> StoreResult<Option<CachedTask>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|t| t.spec.task_id == task_id))
    }

    /// Advance a task's state in place. Unknown ids are ignored (the
    /// tracker may have pruned the row).
    pub fn set_state(&self, task_id: &str, state: TaskState) -> StoreResult<()> {
        let mut tasks = self.list()?;
        let mut touched = false;
        for task in &mut tasks {
            if task.spec.task_id == task_id {
                task.state = state;
                touched = true;
            }
        }
        if touched {
            self.save(&tasks)?;
        }
        Ok(())
    }

    /// Tasks still waiting for an owner.
    pub fn open_tasks(&self) -> StoreResult<Vec<CachedTask>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|t| t.state == TaskState::Open)
            .collect())
    }
}
