pub mod dep;
pub mod ledger;
pub mod run;
pub mod task;

use cadence_core::{CadenceError, Result};
use cadence_scheduler::{SchedulerError, SqliteStore, Task};

/// Look a task up by name, failing with `TaskNotFound`.
pub(crate) fn require_task(store: &SqliteStore, name: &str) -> Result<Task> {
    store
        .get_task_by_name(name)?
        .ok_or_else(|| CadenceError::from(SchedulerError::TaskNotFound {
            name: name.to_string(),
        }))
}
