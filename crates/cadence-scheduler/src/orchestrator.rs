use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{end_of, start_of};
use crate::collab::{DeltaEnumerator, DependencyGate, ExecutionLedger, TaskRegistry};
use crate::context::{Params, RunContext, WorkOutcome};
use crate::error::{Result, SchedulerError};
use crate::report::{DeltaOutcome, RunReport, ScopeMismatch, SkipReason};
use crate::types::{Delta, ProjectId, Task, GLOBAL_PROJECT};

/// Drives a task's due deltas through dependency checks, the caller's work
/// function and the execution ledger.
///
/// Strictly sequential: deltas of one `(task, project)` pair run in ascending
/// order and the next one starts only after the previous reached a terminal
/// outcome.
pub struct Orchestrator<'a> {
    registry: &'a dyn TaskRegistry,
    enumerator: &'a dyn DeltaEnumerator,
    gate: &'a dyn DependencyGate,
    ledger: &'a dyn ExecutionLedger,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a dyn TaskRegistry,
        enumerator: &'a dyn DeltaEnumerator,
        gate: &'a dyn DependencyGate,
        ledger: &'a dyn ExecutionLedger,
    ) -> Self {
        Self {
            registry,
            enumerator,
            gate,
            ledger,
        }
    }

    /// Use one backend for all four collaborators.
    pub fn with_store<S>(store: &'a S) -> Self
    where
        S: TaskRegistry + DeltaEnumerator + DependencyGate + ExecutionLedger,
    {
        Self::new(store, store, store, store)
    }

    /// Run a global (non-project-scoped) task over its due deltas.
    ///
    /// A project-scoped task is not run: the report carries only the
    /// scope-mismatch sentinel and nothing is read or written beyond the
    /// task lookup.
    #[instrument(skip(self, params, work))]
    pub fn run_task<W>(
        &self,
        task_name: &str,
        lookback: u32,
        params: &Params,
        mut work: W,
    ) -> Result<RunReport>
    where
        W: FnMut(&RunContext<'_>) -> WorkOutcome,
    {
        let task = self.resolve(task_name)?;
        if task.is_project_scoped {
            warn!(task = %task.name, "project-scoped task run through global entry point");
            return Ok(RunReport::mismatched(
                task.name,
                ScopeMismatch::ProjectEntryRequired,
            ));
        }

        let mut report = RunReport::new(task.name.clone());
        info!(run_id = %report.run_id, task = %task.name, lookback, "run started");
        self.run_scope(&task, None, lookback, params, &mut report, &mut work)?;
        log_finished(&report);
        Ok(report)
    }

    /// Run a project-scoped task once per project, in the given order.
    ///
    /// A failed delta halts only the project it belongs to, whether the work
    /// or a ledger write failed; the remaining projects are still processed.
    #[instrument(skip(self, project_ids, params, work), fields(projects = project_ids.len()))]
    pub fn run_task_for_projects<W>(
        &self,
        task_name: &str,
        lookback: u32,
        project_ids: &[ProjectId],
        params: &Params,
        mut work: W,
    ) -> Result<RunReport>
    where
        W: FnMut(ProjectId, &RunContext<'_>) -> WorkOutcome,
    {
        let task = self.resolve(task_name)?;
        if !task.is_project_scoped {
            warn!(task = %task.name, "global task run through project entry point");
            return Ok(RunReport::mismatched(
                task.name,
                ScopeMismatch::GlobalEntryRequired,
            ));
        }

        let mut report = RunReport::new(task.name.clone());
        info!(run_id = %report.run_id, task = %task.name, lookback, "run started");
        for &project_id in project_ids {
            self.run_scope(
                &task,
                Some(project_id),
                lookback,
                params,
                &mut report,
                &mut |ctx| work(project_id, ctx),
            )?;
        }
        log_finished(&report);
        Ok(report)
    }

    fn resolve(&self, name: &str) -> Result<Task> {
        self.registry
            .resolve_task(name)?
            .ok_or_else(|| SchedulerError::TaskNotFound {
                name: name.to_string(),
            })
    }

    /// Process every due delta of one `(task, project)` pair, halting at the
    /// first failed work invocation or ledger write.
    ///
    /// Ledger write failures are recorded in the report rather than returned,
    /// so they never cross into another project's scope.
    fn run_scope(
        &self,
        task: &Task,
        project: Option<ProjectId>,
        lookback: u32,
        params: &Params,
        report: &mut RunReport,
        work: &mut dyn FnMut(&RunContext<'_>) -> WorkOutcome,
    ) -> Result<()> {
        let project_id = project.unwrap_or(GLOBAL_PROJECT);
        let mut deltas = self.enumerator.due_deltas(task, project_id, lookback)?;
        deltas.sort_unstable();
        deltas.dedup();
        debug!(task = %task.name, project_id, due = deltas.len(), "due deltas");

        for delta in deltas {
            if !self.gate.is_dependency_satisfied(task, project_id, delta)? {
                warn!(task = %task.name, project_id, %delta, "dependency not done, deferring");
                report.record(
                    delta,
                    project,
                    DeltaOutcome::Skipped {
                        reason: SkipReason::DependencyNotDone,
                    },
                );
                continue;
            }

            // An undecodable delta must not reach the ledger.
            let start = start_of(delta)?;
            let end = end_of(delta, task.frequency, task.frequency_interval)?;

            if let Err(e) = self.ledger.begin(task.id, project_id, delta) {
                let err = SchedulerError::ledger("begin", task.id, project_id, delta, e);
                halt_on_ledger_error(report, task, project, delta, err, None);
                break;
            }

            let ctx = RunContext {
                task,
                project_id: project,
                delta,
                start,
                end,
                params,
            };
            match work(&ctx) {
                WorkOutcome::Success(payload) => {
                    if let Err(e) = self.ledger.complete(task.id, project_id, delta) {
                        let err = SchedulerError::ledger("complete", task.id, project_id, delta, e);
                        halt_on_ledger_error(report, task, project, delta, err, Some(payload));
                        break;
                    }
                    info!(task = %task.name, project_id, %delta, "delta completed");
                    report.record(delta, project, DeltaOutcome::Succeeded { payload });
                }
                WorkOutcome::Failure(payload) => {
                    if let Err(e) = self.ledger.delete_complete(task.id, project_id, delta) {
                        let err = SchedulerError::ledger("delete", task.id, project_id, delta, e);
                        halt_on_ledger_error(report, task, project, delta, err, Some(payload));
                        break;
                    }
                    warn!(
                        task = %task.name,
                        project_id,
                        %delta,
                        "work failed, halting remaining deltas for this scope"
                    );
                    report.record(delta, project, DeltaOutcome::Failed { payload });
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Record a failed ledger write as a failure of `delta`. The caller halts the
/// scope; other projects are unaffected.
fn halt_on_ledger_error(
    report: &mut RunReport,
    task: &Task,
    project: Option<ProjectId>,
    delta: Delta,
    err: SchedulerError,
    work_payload: Option<Value>,
) {
    error!(
        task = %task.name,
        project_id = project.unwrap_or(GLOBAL_PROJECT),
        %delta,
        error = %err,
        "ledger write failed, halting remaining deltas for this scope"
    );
    report.record(delta, project, DeltaOutcome::ledger_failure(&err, work_payload));
}

fn log_finished(report: &RunReport) {
    info!(
        run_id = %report.run_id,
        task = %report.task,
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped(),
        "run finished"
    );
}
