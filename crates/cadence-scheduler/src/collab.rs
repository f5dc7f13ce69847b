//! Contracts the orchestrator drives. [`crate::store::SqliteStore`]
//! implements all four; tests substitute fakes.

use crate::error::Result;
use crate::types::{Delta, ProjectId, Task, TaskId};

/// Resolves task names to metadata.
pub trait TaskRegistry {
    /// `Ok(None)` when no task has this name. Implementations must not
    /// fabricate a default task.
    fn resolve_task(&self, name: &str) -> Result<Option<Task>>;
}

/// Lists the deltas still due for a `(task, project)` pair.
pub trait DeltaEnumerator {
    /// Deltas within `lookback` periods of now that have no completion
    /// marker. Order is unspecified.
    fn due_deltas(&self, task: &Task, project_id: ProjectId, lookback: u32) -> Result<Vec<Delta>>;
}

/// Go/no-go check against upstream tasks.
pub trait DependencyGate {
    /// True when every upstream task of `task` has finished `delta` for
    /// `project_id`. Tasks without dependencies are always satisfied.
    fn is_dependency_satisfied(
        &self,
        task: &Task,
        project_id: ProjectId,
        delta: Delta,
    ) -> Result<bool>;
}

/// Durable begin/complete markers. Every operation is idempotent.
pub trait ExecutionLedger {
    fn begin(&self, task_id: TaskId, project_id: ProjectId, delta: Delta) -> Result<()>;

    fn complete(&self, task_id: TaskId, project_id: ProjectId, delta: Delta) -> Result<()>;

    /// Remove any marker for the delta; a no-op when none exists.
    fn delete_complete(&self, task_id: TaskId, project_id: ProjectId, delta: Delta) -> Result<()>;
}
