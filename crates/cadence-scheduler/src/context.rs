use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::{Delta, ProjectId, Task};

/// Caller-supplied parameters handed to every work invocation.
pub type Params = serde_json::Map<String, Value>;

/// Key under which [`RunContext::to_config`] exposes the period start (unix seconds).
pub const START_TIMESTAMP_KEY: &str = "startTimestamp";
/// Key under which [`RunContext::to_config`] exposes the period end (unix seconds).
pub const END_TIMESTAMP_KEY: &str = "endTimestamp";

/// Inputs of one work invocation. Built fresh for every delta and never
/// mutated, so invocations share nothing but the borrowed parameters.
#[derive(Debug, Clone)]
pub struct RunContext<'a> {
    pub task: &'a Task,
    /// `None` for non-project-scoped tasks.
    pub project_id: Option<ProjectId>,
    pub delta: Delta,
    /// Inclusive period start.
    pub start: DateTime<Utc>,
    /// Inclusive period end.
    pub end: DateTime<Utc>,
    pub params: &'a Params,
}

impl RunContext<'_> {
    pub fn start_timestamp(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_timestamp(&self) -> i64 {
        self.end.timestamp()
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Flatten into a single configuration map: the caller's parameters plus
    /// `startTimestamp`/`endTimestamp`, which always win over same-named params.
    pub fn to_config(&self) -> Params {
        let mut config = self.params.clone();
        config.insert(START_TIMESTAMP_KEY.to_string(), self.start_timestamp().into());
        config.insert(END_TIMESTAMP_KEY.to_string(), self.end_timestamp().into());
        config
    }
}

/// What a work function reports back: a payload and whether it succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    Success(Value),
    Failure(Value),
}

impl WorkOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkOutcome::Success(_))
    }

    pub fn payload(&self) -> &Value {
        match self {
            WorkOutcome::Success(payload) | WorkOutcome::Failure(payload) => payload,
        }
    }
}

impl From<(Value, bool)> for WorkOutcome {
    fn from((payload, success): (Value, bool)) -> Self {
        if success {
            WorkOutcome::Success(payload)
        } else {
            WorkOutcome::Failure(payload)
        }
    }
}
