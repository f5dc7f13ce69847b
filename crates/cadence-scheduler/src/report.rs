use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::types::{Delta, ProjectId};

/// Status recorded for a delta whose upstream work is unfinished.
pub const DEPENDENCY_NOT_DONE: &str = "dependency not done yet";
/// Status returned when a project-scoped task is run through `run_task`.
pub const PROJECT_ENTRY_REQUIRED: &str = "Call ProjectId Enabled Func";
/// Status returned when a global task is run through `run_task_for_projects`.
pub const GLOBAL_ENTRY_REQUIRED: &str = "Call Non ProjectId Enabled Func";

/// `error` field of the payload recorded when a ledger write fails.
pub const LEDGER_ERROR: &str = "LEDGER_ERROR";

/// Which entry point the task should have been run through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMismatch {
    ProjectEntryRequired,
    GlobalEntryRequired,
}

impl ScopeMismatch {
    pub fn message(self) -> &'static str {
        match self {
            ScopeMismatch::ProjectEntryRequired => PROJECT_ENTRY_REQUIRED,
            ScopeMismatch::GlobalEntryRequired => GLOBAL_ENTRY_REQUIRED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DependencyNotDone,
}

impl SkipReason {
    pub fn message(self) -> &'static str {
        match self {
            SkipReason::DependencyNotDone => DEPENDENCY_NOT_DONE,
        }
    }
}

/// Result of one delta within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeltaOutcome {
    /// Work succeeded and the completion marker was written.
    Succeeded { payload: Value },
    /// Work failed, or a ledger write for the delta failed; the scope halted.
    Failed { payload: Value },
    /// Work was not attempted; the delta stays due.
    Skipped { reason: SkipReason },
}

impl DeltaOutcome {
    pub fn payload(&self) -> Option<&Value> {
        match self {
            DeltaOutcome::Succeeded { payload } | DeltaOutcome::Failed { payload } => {
                Some(payload)
            }
            DeltaOutcome::Skipped { .. } => None,
        }
    }

    /// Failure entry for a delta whose ledger write failed. `work` is the
    /// payload the work function returned, if it had already run.
    pub(crate) fn ledger_failure(err: &SchedulerError, work: Option<Value>) -> Self {
        let mut payload = Map::new();
        payload.insert("error".to_string(), Value::String(LEDGER_ERROR.to_string()));
        if let SchedulerError::Ledger { op, .. } = err {
            payload.insert("op".to_string(), Value::String(op.to_string()));
        }
        payload.insert("message".to_string(), Value::String(err.to_string()));
        if let Some(work) = work {
            payload.insert("work".to_string(), work);
        }
        DeltaOutcome::Failed {
            payload: Value::Object(payload),
        }
    }

    /// Value written into the legacy status map for this outcome.
    fn status_value(&self) -> Value {
        match self {
            DeltaOutcome::Succeeded { payload } | DeltaOutcome::Failed { payload } => {
                payload.clone()
            }
            DeltaOutcome::Skipped { reason } => Value::String(reason.message().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub delta: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(flatten)]
    pub outcome: DeltaOutcome,
}

impl ReportEntry {
    /// `"<delta>"` for global runs, `"<delta>:<project>"` for project runs.
    pub fn key(&self) -> String {
        match self.project_id {
            Some(project_id) => format!("{}:{project_id}", self.delta),
            None => self.delta.to_string(),
        }
    }
}

/// Everything one orchestrator call produced, in processing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// UUID v7 identifying this run in logs.
    pub run_id: String,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_mismatch: Option<ScopeMismatch>,
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::now_v7().to_string(),
            task: task.into(),
            scope_mismatch: None,
            entries: Vec::new(),
        }
    }

    /// A report holding nothing but the scope-mismatch sentinel.
    pub fn mismatched(task: impl Into<String>, mismatch: ScopeMismatch) -> Self {
        Self {
            scope_mismatch: Some(mismatch),
            ..Self::new(task)
        }
    }

    pub(crate) fn record(
        &mut self,
        delta: Delta,
        project_id: Option<ProjectId>,
        outcome: DeltaOutcome,
    ) {
        self.entries.push(ReportEntry {
            delta,
            project_id,
            outcome,
        });
    }

    pub fn is_scope_mismatch(&self) -> bool {
        self.scope_mismatch.is_some()
    }

    pub fn outcome(&self, delta: Delta, project_id: Option<ProjectId>) -> Option<&DeltaOutcome> {
        self.entries
            .iter()
            .find(|e| e.delta == delta && e.project_id == project_id)
            .map(|e| &e.outcome)
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, DeltaOutcome::Succeeded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DeltaOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DeltaOutcome::Skipped { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&DeltaOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }

    /// Flat `key -> payload | status` map, the shape consumers of the old
    /// untyped report expect. A scope mismatch yields `{"status": <sentinel>}`.
    pub fn to_status_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(mismatch) = self.scope_mismatch {
            map.insert(
                "status".to_string(),
                Value::String(mismatch.message().to_string()),
            );
            return map;
        }
        for entry in &self.entries {
            map.insert(entry.key(), entry.outcome.status_value());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mismatch_map_holds_only_the_sentinel() {
        let report = RunReport::mismatched("DashboardCaching", ScopeMismatch::ProjectEntryRequired);
        assert_eq!(
            Value::Object(report.to_status_map()),
            json!({"status": "Call ProjectId Enabled Func"})
        );
    }

    #[test]
    fn status_map_keys_include_project() {
        let mut report = RunReport::new("CacheRefresh");
        report.record(
            Delta::new(2024010500),
            Some(7),
            DeltaOutcome::Skipped {
                reason: SkipReason::DependencyNotDone,
            },
        );
        report.record(
            Delta::new(2024010400),
            Some(7),
            DeltaOutcome::Succeeded {
                payload: json!({"rows": 3}),
            },
        );

        let map = report.to_status_map();
        assert_eq!(map["2024010500:7"], json!("dependency not done yet"));
        assert_eq!(map["2024010400:7"], json!({"rows": 3}));
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(!report.has_failures());
    }

    #[test]
    fn entries_serialize_with_outcome_tag() {
        let mut report = RunReport::new("Archive");
        report.record(
            Delta::new(2024010100),
            None,
            DeltaOutcome::Failed {
                payload: json!("disk full"),
            },
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value["entries"][0],
            json!({"delta": 2024010100, "outcome": "failed", "payload": "disk full"})
        );
        assert!(value.get("scope_mismatch").is_none());
    }

    #[test]
    fn ledger_failure_keeps_the_work_payload() {
        let err = SchedulerError::ledger(
            "complete",
            3,
            7,
            Delta::new(2024010100),
            SchedulerError::Store("disk full".into()),
        );
        let outcome = DeltaOutcome::ledger_failure(&err, Some(json!({"rows": 3})));

        let payload = outcome.payload().unwrap();
        assert_eq!(payload["error"], json!("LEDGER_ERROR"));
        assert_eq!(payload["op"], json!("complete"));
        assert_eq!(payload["work"], json!({"rows": 3}));
        assert!(payload["message"].as_str().unwrap().contains("disk full"));
    }
}
