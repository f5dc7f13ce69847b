use cadence_core::Result;
use cadence_scheduler::SqliteStore;

use super::require_task;
use crate::cli::LedgerArgs;

pub fn execute(args: LedgerArgs, store: &SqliteStore) -> Result<()> {
    let task = require_task(store, &args.task)?;
    let records = store.execution_records(task.id, task.ledger_project(args.project))?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
