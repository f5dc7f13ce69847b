use thiserror::Error;

use crate::types::{Delta, ProjectId, TaskId};

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A delta identifier that does not decode to a valid UTC hour.
    #[error("Invalid delta {delta}: {reason}")]
    InvalidDelta { delta: u64, reason: String },

    /// A stored or configured frequency outside the supported set.
    #[error("Unknown frequency: {0}")]
    UnknownFrequency(String),

    /// No task is registered under the given name or id.
    #[error("Task not found: {name}")]
    TaskNotFound { name: String },

    /// A task with this name is already registered.
    #[error("Task already exists: {name}")]
    TaskExists { name: String },

    /// The task definition is invalid (e.g. zero frequency interval).
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Registering this dependency would close a cycle.
    #[error("Circular dependency: task {task_id} cannot depend on {upstream_id}")]
    CircularDependency { task_id: TaskId, upstream_id: TaskId },

    /// No dependency edge exists between the two tasks.
    #[error("Dependency not found: task {task_id} -> {upstream_id}")]
    DependencyNotFound { task_id: TaskId, upstream_id: TaskId },

    /// An execution ledger write failed for a specific delta.
    #[error("Ledger {op} failed for task {task_id}, project {project_id}, delta {delta}: {source}")]
    Ledger {
        op: &'static str,
        task_id: TaskId,
        project_id: ProjectId,
        delta: Delta,
        #[source]
        source: Box<SchedulerError>,
    },

    /// The backing store is unusable (poisoned lock, unavailable backend).
    #[error("Store error: {0}")]
    Store(String),
}

impl SchedulerError {
    pub(crate) fn invalid_delta(delta: Delta, reason: impl Into<String>) -> Self {
        SchedulerError::InvalidDelta {
            delta: delta.get(),
            reason: reason.into(),
        }
    }

    pub(crate) fn ledger(
        op: &'static str,
        task_id: TaskId,
        project_id: ProjectId,
        delta: Delta,
        source: SchedulerError,
    ) -> Self {
        SchedulerError::Ledger {
            op,
            task_id,
            project_id,
            delta,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
