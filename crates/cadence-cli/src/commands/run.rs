use std::time::Duration;

use cadence_core::config::SchedulerConfig;
use cadence_core::{CadenceError, Result};
use cadence_scheduler::{Orchestrator, Params, RunContext, RunReport, SqliteStore};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::info;

use crate::cli::RunArgs;
use crate::work;

/// Run the task's command over every due period and return the report.
///
/// Without `--projects` the task is run through the global entry point;
/// with them, through the per-project one. A task registered with the other
/// scope yields a report holding only the scope-mismatch sentinel.
pub async fn execute(args: RunArgs, store: SqliteStore, config: &SchedulerConfig) -> Result<RunReport> {
    let lookback = args.lookback.unwrap_or(config.default_lookback);
    let timeout = Duration::from_secs(args.timeout.unwrap_or(config.work_timeout_secs));
    if timeout.is_zero() {
        return Err(CadenceError::InvalidArgument(
            "timeout must be positive".to_string(),
        ));
    }
    let params: Params = args
        .params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    let RunArgs {
        task,
        projects,
        command,
        ..
    } = args;

    info!(task = %task, lookback, projects = projects.len(), "starting run");

    // The orchestrator is synchronous; each work call blocks this worker
    // thread on the async command.
    let handle = Handle::current();
    let report = tokio::task::spawn_blocking(move || {
        let orchestrator = Orchestrator::with_store(&store);
        let work = |ctx: &RunContext<'_>| handle.block_on(work::run_for(ctx, &command, timeout));
        if projects.is_empty() {
            orchestrator.run_task(&task, lookback, &params, work)
        } else {
            orchestrator.run_task_for_projects(&task, lookback, &projects, &params, |_, ctx| work(ctx))
        }
    })
    .await
    .map_err(|e| CadenceError::Work(format!("run aborted: {e}")))??;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_scheduler::{Delta, DeltaOutcome, Frequency, NewTask, ScopeMismatch};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn store() -> SqliteStore {
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        SqliteStore::open_in_memory().unwrap().with_clock(move || now)
    }

    fn args(task: &str, projects: Vec<i64>, script: &str) -> RunArgs {
        RunArgs {
            task: task.to_string(),
            lookback: Some(1),
            projects,
            params: vec![("mode".to_string(), "full".to_string())],
            timeout: Some(10),
            command: vec!["sh".into(), "-c".into(), script.into()],
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_command_per_due_period() {
        let store = store();
        let task = store.register_task(NewTask::new("Rollup", Frequency::Daily)).unwrap();

        let report = execute(
            args("Rollup", vec![], "echo $CADENCE_DELTA-$CADENCE_PARAM_MODE"),
            store.clone(),
            &SchedulerConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(
            report.outcome(Delta::new(2024010300), None).and_then(|o| o.payload()),
            Some(&json!({"exitCode": 0, "stdout": "2024010300-full", "stderr": ""}))
        );
        let records = store.execution_records(task.id, 0).unwrap();
        assert!(records.iter().all(|r| r.is_completed()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_command_halts_the_project() {
        let store = store();
        let task = store
            .register_task(NewTask::new("Rollup", Frequency::Daily).project_scoped())
            .unwrap();

        let report = execute(
            args("Rollup", vec![5, 6], "[ \"$CADENCE_PROJECT_ID\" = 6 ]"),
            store.clone(),
            &SchedulerConfig::default(),
        )
        .await
        .unwrap();

        assert!(matches!(
            report.outcome(Delta::new(2024010200), Some(5)),
            Some(DeltaOutcome::Failed { .. })
        ));
        assert!(report.outcome(Delta::new(2024010300), Some(5)).is_none());
        assert_eq!(report.succeeded(), 2);
        assert!(store.execution_records(task.id, 5).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn project_task_without_projects_is_a_scope_mismatch() {
        let store = store();
        store
            .register_task(NewTask::new("DashboardCaching", Frequency::Daily).project_scoped())
            .unwrap();

        let report = execute(
            args("DashboardCaching", vec![], "true"),
            store,
            &SchedulerConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(report.scope_mismatch, Some(ScopeMismatch::ProjectEntryRequired));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_task_is_an_error() {
        let err = execute(args("Nope", vec![], "true"), store(), &SchedulerConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TASK_NOT_FOUND");
    }
}
