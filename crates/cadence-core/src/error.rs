use cadence_scheduler::SchedulerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Work command failed to start: {0}")]
    Work(String),

    #[error("Work timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CadenceError {
    /// Stable error code, printed by the CLI and embedded in failure payloads.
    pub fn code(&self) -> &'static str {
        match self {
            CadenceError::Config(_) => "CONFIG_ERROR",
            CadenceError::Scheduler(e) => scheduler_code(e),
            CadenceError::InvalidArgument(_) => "INVALID_ARGUMENT",
            CadenceError::Work(_) => "WORK_ERROR",
            CadenceError::Timeout { .. } => "TIMEOUT",
            CadenceError::Serialization(_) => "SERIALIZATION_ERROR",
            CadenceError::Io(_) => "IO_ERROR",
        }
    }
}

fn scheduler_code(err: &SchedulerError) -> &'static str {
    match err {
        SchedulerError::Database(_) => "DATABASE_ERROR",
        SchedulerError::InvalidDelta { .. } => "INVALID_DELTA",
        SchedulerError::UnknownFrequency(_) => "UNKNOWN_FREQUENCY",
        SchedulerError::TaskNotFound { .. } => "TASK_NOT_FOUND",
        SchedulerError::TaskExists { .. } => "TASK_EXISTS",
        SchedulerError::InvalidTask(_) => "INVALID_TASK",
        SchedulerError::CircularDependency { .. } => "CIRCULAR_DEPENDENCY",
        SchedulerError::DependencyNotFound { .. } => "DEPENDENCY_NOT_FOUND",
        SchedulerError::Ledger { .. } => "LEDGER_ERROR",
        SchedulerError::Store(_) => "STORE_ERROR",
    }
}

pub type Result<T> = std::result::Result<T, CadenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_errors_keep_their_own_codes() {
        let err: CadenceError = SchedulerError::TaskNotFound {
            name: "Ingest".into(),
        }
        .into();
        assert_eq!(err.code(), "TASK_NOT_FOUND");
        assert_eq!(err.to_string(), "Task not found: Ingest");
    }

    #[test]
    fn timeout_message_names_the_limit() {
        let err = CadenceError::Timeout { secs: 30 };
        assert_eq!(err.code(), "TIMEOUT");
        assert_eq!(err.to_string(), "Work timed out after 30s");
    }
}
