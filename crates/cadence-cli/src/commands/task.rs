use cadence_core::Result;
use cadence_scheduler::{NewTask, SqliteStore, Task};

use crate::cli::{RegisterArgs, TaskCommand};

pub fn execute(cmd: TaskCommand, store: &SqliteStore) -> Result<()> {
    match cmd {
        TaskCommand::Register(args) => {
            let task = register(args, store)?;
            println!("registered task #{} {} ({})", task.id, task.name, describe(&task));
        }
        TaskCommand::List => {
            let tasks = store.list_tasks()?;
            if tasks.is_empty() {
                println!("no tasks registered");
            }
            for task in tasks {
                println!("{:>4}  {:<32} {}", task.id, task.name, describe(&task));
            }
        }
    }
    Ok(())
}

pub fn register(args: RegisterArgs, store: &SqliteStore) -> Result<Task> {
    let mut new = NewTask::new(args.name, args.frequency)
        .interval(args.interval)
        .slots(args.skip_start, args.skip_end)
        .recurrence(!args.no_recurrence)
        .offset_start_minutes(args.offset_minutes);
    if args.project_scoped {
        new = new.project_scoped();
    }
    Ok(store.register_task(new)?)
}

/// One-line summary such as `every 6 hourly, slots 0-18, project-scoped`.
fn describe(task: &Task) -> String {
    let mut out = if task.frequency_interval == 1 {
        task.frequency.to_string()
    } else {
        format!("every {} {}", task.frequency_interval, task.frequency)
    };
    if task.skip_start_index != 0 || task.skip_end_index.is_some() || !task.recurrence {
        match (task.recurrence, task.skip_end_index) {
            (false, _) => out.push_str(&format!(", slot {} only", task.skip_start_index)),
            (true, Some(end)) => out.push_str(&format!(", slots {}-{end}", task.skip_start_index)),
            (true, None) => out.push_str(&format!(", slots from {}", task.skip_start_index)),
        }
    }
    if task.offset_start_minutes != 0 {
        out.push_str(&format!(", +{}m", task.offset_start_minutes));
    }
    if task.is_project_scoped {
        out.push_str(", project-scoped");
    }
    out
}
