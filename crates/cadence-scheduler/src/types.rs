use chrono::{DateTime, Datelike, Duration, Months, Timelike, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Row id of a registered task.
pub type TaskId = i64;

/// Tenant identifier. Non-project-scoped tasks are keyed by [`GLOBAL_PROJECT`].
pub type ProjectId = i64;

/// Project id used for every ledger row of a non-project-scoped task.
pub const GLOBAL_PROJECT: ProjectId = 0;

/// How often a task runs; the period length is `frequency * interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    /// Shift `at` by `units` periods of this frequency (negative moves back).
    ///
    /// Month-based frequencies use calendar months, clamping to the last day
    /// of shorter months. Returns `None` on overflow.
    pub fn shift(self, at: DateTime<Utc>, units: i64) -> Option<DateTime<Utc>> {
        match self {
            Frequency::Hourly => at.checked_add_signed(Duration::try_hours(units)?),
            Frequency::Daily => at.checked_add_signed(Duration::try_days(units)?),
            Frequency::Weekly => at.checked_add_signed(Duration::try_weeks(units)?),
            Frequency::Monthly => shift_months(at, units),
            Frequency::Quarterly => shift_months(at, units.checked_mul(3)?),
        }
    }

    /// Relative granularity, finest first. Used to compare dependency frequencies.
    pub fn rank(self) -> u8 {
        match self {
            Frequency::Hourly => 0,
            Frequency::Daily => 1,
            Frequency::Weekly => 2,
            Frequency::Monthly => 3,
            Frequency::Quarterly => 4,
        }
    }

    pub fn is_finer_than(self, other: Frequency) -> bool {
        self.rank() < other.rank()
    }
}

fn shift_months(at: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let span = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        at.checked_add_months(span)
    } else {
        at.checked_sub_months(span)
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Frequency {
    type Err = SchedulerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            _ => Err(SchedulerError::UnknownFrequency(s.to_string())),
        }
    }
}

/// One scheduling period's start, packed as `YYYYMMDD * 100 + hour`.
///
/// Integer order equals chronological order. The packed form only exists at
/// the storage boundary; see [`crate::clock`] for decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(u64);

impl Delta {
    pub const fn new(raw: u64) -> Self {
        Delta(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Encode the hour containing `at`. Minutes and seconds are dropped.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let year = u64::from(at.year().unsigned_abs());
        let packed = year * 1_000_000
            + u64::from(at.month()) * 10_000
            + u64::from(at.day()) * 100
            + u64::from(at.hour());
        Delta(packed)
    }
}

impl std::fmt::Display for Delta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Delta {
    type Err = SchedulerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Delta)
            .map_err(|e| SchedulerError::InvalidDelta {
                delta: 0,
                reason: format!("{s:?} is not an integer: {e}"),
            })
    }
}

impl ToSql for Delta {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = i64::try_from(self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(value))
    }
}

impl FromSql for Delta {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        u64::try_from(raw)
            .map(Delta)
            .map_err(|_| FromSqlError::OutOfRange(raw))
    }
}

/// Metadata of a schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Unique lookup key.
    pub name: String,
    pub frequency: Frequency,
    /// Positive multiplier on `frequency`.
    pub frequency_interval: u32,
    /// First active slot (hour of day for hourly, weekday with Sunday = 0 for daily).
    pub skip_start_index: u32,
    /// Last active slot. `None` means the end of the frequency's range.
    pub skip_end_index: Option<u32>,
    /// When false only `skip_start_index` is active.
    pub recurrence: bool,
    /// Deltas become due this many minutes after their period start.
    pub offset_start_minutes: i64,
    /// Fixed at registration; selects the valid orchestrator entry point.
    pub is_project_scoped: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    /// Ledger key for this task under `project_id`; global tasks always use
    /// [`GLOBAL_PROJECT`].
    pub fn ledger_project(&self, project_id: ProjectId) -> ProjectId {
        if self.is_project_scoped {
            project_id
        } else {
            GLOBAL_PROJECT
        }
    }
}

/// Registration request for a new task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub frequency: Frequency,
    pub frequency_interval: u32,
    pub skip_start_index: u32,
    pub skip_end_index: Option<u32>,
    pub recurrence: bool,
    pub offset_start_minutes: i64,
    pub is_project_scoped: bool,
}

impl NewTask {
    /// A recurring task with interval 1, every slot active and no start offset.
    pub fn new(name: impl Into<String>, frequency: Frequency) -> Self {
        Self {
            name: name.into(),
            frequency,
            frequency_interval: 1,
            skip_start_index: 0,
            skip_end_index: None,
            recurrence: true,
            offset_start_minutes: 0,
            is_project_scoped: false,
        }
    }

    pub fn interval(mut self, interval: u32) -> Self {
        self.frequency_interval = interval;
        self
    }

    pub fn project_scoped(mut self) -> Self {
        self.is_project_scoped = true;
        self
    }

    pub fn slots(mut self, start: u32, end: Option<u32>) -> Self {
        self.skip_start_index = start;
        self.skip_end_index = end;
        self
    }

    pub fn recurrence(mut self, recurrence: bool) -> Self {
        self.recurrence = recurrence;
        self
    }

    pub fn offset_start_minutes(mut self, minutes: i64) -> Self {
        self.offset_start_minutes = minutes;
        self
    }
}

/// Edge `task_id -> upstream_id`: `task_id` may only run a period once
/// `upstream_id` has finished it, shifted by `offset` downstream periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub task_id: TaskId,
    pub upstream_id: TaskId,
    pub offset: i32,
}

/// One row of the execution ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub delta: Delta,
    /// RFC 3339 timestamp of the latest attempt start.
    pub began_at: Option<String>,
    /// RFC 3339 timestamp of success; absent means the delta is still due.
    pub completed_at: Option<String>,
}

impl ExecutionRecord {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn frequency_roundtrips_through_text() {
        for freq in [
            Frequency::Hourly,
            Frequency::Daily,
            Frequency::Weekly,
            Frequency::Monthly,
            Frequency::Quarterly,
        ] {
            let parsed: Frequency = freq.to_string().parse().unwrap();
            assert_eq!(parsed, freq);
        }
    }

    #[test]
    fn unknown_frequency_is_rejected() {
        let err = "stateless".parse::<Frequency>().unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownFrequency(ref s) if s == "stateless"));
    }

    #[test]
    fn delta_packs_the_hour() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 12).unwrap();
        assert_eq!(Delta::from_datetime(at), Delta::new(2024030917));
    }

    #[test]
    fn delta_order_is_chronological() {
        let earlier = Delta::new(2023123123);
        let later = Delta::new(2024010100);
        assert!(earlier < later);
    }

    #[test]
    fn quarterly_shift_moves_three_months() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let shifted = Frequency::Quarterly.shift(at, -1).unwrap();
        assert_eq!(shifted, Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn global_tasks_ignore_project_id() {
        let task = Task {
            id: 1,
            name: "Ingest".into(),
            frequency: Frequency::Daily,
            frequency_interval: 1,
            skip_start_index: 0,
            skip_end_index: None,
            recurrence: true,
            offset_start_minutes: 0,
            is_project_scoped: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(task.ledger_project(42), GLOBAL_PROJECT);
    }
}
