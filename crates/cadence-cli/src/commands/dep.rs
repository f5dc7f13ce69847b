use cadence_core::Result;
use cadence_scheduler::SqliteStore;

use super::require_task;
use crate::cli::DepCommand;

pub fn execute(cmd: DepCommand, store: &SqliteStore) -> Result<()> {
    match cmd {
        DepCommand::Add(args) => {
            let task = require_task(store, &args.task)?;
            let upstream = require_task(store, &args.upstream)?;
            let dep = store.register_dependency(task.id, upstream.id, args.offset)?;
            println!(
                "{} now waits for {} (offset {})",
                task.name, upstream.name, dep.offset
            );
        }
        DepCommand::Remove(args) => {
            let task = require_task(store, &args.task)?;
            let upstream = require_task(store, &args.upstream)?;
            store.deregister_dependency(task.id, upstream.id)?;
            println!("{} no longer waits for {}", task.name, upstream.name);
        }
    }
    Ok(())
}
