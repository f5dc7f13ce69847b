//! `cadence-scheduler`: delta-based batch scheduling with a SQLite ledger.
//!
//! # Overview
//!
//! Time is cut into fixed periods ("deltas") encoded as `YYYYMMDDHH`. The
//! [`orchestrator::Orchestrator`] asks the [`collab::DeltaEnumerator`] which
//! deltas of a task are still due, checks each against the
//! [`collab::DependencyGate`], and runs caller-supplied work inside a
//! begin/complete bracket on the [`collab::ExecutionLedger`]. A failed delta
//! has its marker removed and halts the rest of that project's run.
//!
//! [`store::SqliteStore`] implements every collaborator on one connection.
//!
//! # Frequencies
//!
//! | Frequency   | Period start                          | Slots             |
//! |-------------|---------------------------------------|-------------------|
//! | `Hourly`    | top of the hour                       | hour of day 0-23  |
//! | `Daily`     | midnight UTC                          | weekday, Sun = 0  |
//! | `Weekly`    | Sunday midnight UTC                   | none              |
//! | `Monthly`   | first of the month                    | none              |
//! | `Quarterly` | first of Jan / Apr / Jul / Oct        | none              |

pub mod clock;
pub mod collab;
pub mod context;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod schedule;
pub mod store;
pub mod types;

pub use collab::{DeltaEnumerator, DependencyGate, ExecutionLedger, TaskRegistry};
pub use context::{Params, RunContext, WorkOutcome};
pub use error::{Result, SchedulerError};
pub use orchestrator::Orchestrator;
pub use report::{DeltaOutcome, ReportEntry, RunReport, ScopeMismatch, SkipReason};
pub use store::SqliteStore;
pub use types::{Delta, Dependency, ExecutionRecord, Frequency, NewTask, ProjectId, Task, TaskId};
