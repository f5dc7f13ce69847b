use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::clock::{end_of, start_of};
use crate::collab::{DeltaEnumerator, DependencyGate, ExecutionLedger, TaskRegistry};
use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::schedule::{configured_deltas, deltas_between};
use crate::types::{Delta, Dependency, ExecutionRecord, Frequency, NewTask, ProjectId, Task, TaskId};

const TASK_COLUMNS: &str = "task_id, name, frequency, frequency_interval, skip_start_index,
     skip_end_index, recurrence, offset_start_minutes, is_project_scoped, created_at, updated_at";

type Now = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// SQLite-backed registry, enumerator, dependency gate and ledger.
///
/// Cheap to clone; clones share one `Connection` behind a `Mutex`.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    now: Now,
}

impl SqliteStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            now: Arc::new(Utc::now),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Replace the wall clock used for enumeration windows and ledger stamps.
    pub fn with_clock(mut self, now: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.now = Arc::new(now);
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SchedulerError::Store("connection mutex poisoned".to_string()))
    }

    fn now_str(&self) -> String {
        (self.now)().to_rfc3339()
    }

    // --- registry ----------------------------------------------------------

    /// Register a task. Names are unique and the interval must be positive.
    pub fn register_task(&self, new: NewTask) -> Result<Task> {
        if new.frequency_interval == 0 {
            return Err(SchedulerError::InvalidTask(format!(
                "{}: frequency interval must be positive",
                new.name
            )));
        }
        if new.name.trim().is_empty() {
            return Err(SchedulerError::InvalidTask(
                "task name must not be empty".to_string(),
            ));
        }

        let conn = self.conn()?;
        let now = self.now_str();
        let inserted = conn.execute(
            "INSERT INTO tasks
             (name, frequency, frequency_interval, skip_start_index, skip_end_index,
              recurrence, offset_start_minutes, is_project_scoped, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?9)
             ON CONFLICT(name) DO NOTHING",
            rusqlite::params![
                new.name,
                new.frequency.to_string(),
                new.frequency_interval,
                new.skip_start_index,
                new.skip_end_index,
                new.recurrence,
                new.offset_start_minutes,
                new.is_project_scoped,
                now,
            ],
        )?;
        if inserted == 0 {
            return Err(SchedulerError::TaskExists { name: new.name });
        }

        let id = conn.last_insert_rowid();
        info!(task_id = id, name = %new.name, frequency = %new.frequency, "task registered");
        Ok(Task {
            id,
            name: new.name,
            frequency: new.frequency,
            frequency_interval: new.frequency_interval,
            skip_start_index: new.skip_start_index,
            skip_end_index: new.skip_end_index,
            recurrence: new.recurrence,
            offset_start_minutes: new.offset_start_minutes,
            is_project_scoped: new.is_project_scoped,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get_task_by_name(&self, name: &str) -> Result<Option<Task>> {
        let conn = self.conn()?;
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE name = ?1"),
                [name],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    pub fn get_task_by_id(&self, id: TaskId) -> Result<Option<Task>> {
        let conn = self.conn()?;
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"),
                [id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// All tasks ordered by id.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY task_id"))?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    // --- dependencies ------------------------------------------------------

    /// Make `task_id` wait for `upstream_id`. Re-registering an existing edge
    /// updates its offset.
    pub fn register_dependency(
        &self,
        task_id: TaskId,
        upstream_id: TaskId,
        offset: i32,
    ) -> Result<Dependency> {
        for id in [task_id, upstream_id] {
            if self.get_task_by_id(id)?.is_none() {
                return Err(SchedulerError::TaskNotFound {
                    name: format!("#{id}"),
                });
            }
        }
        if task_id == upstream_id || self.reaches(upstream_id, task_id)? {
            return Err(SchedulerError::CircularDependency {
                task_id,
                upstream_id,
            });
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO task_dependencies (task_id, upstream_id, dependency_offset, created_at)
             VALUES (?1,?2,?3,?4)
             ON CONFLICT(task_id, upstream_id)
             DO UPDATE SET dependency_offset = excluded.dependency_offset",
            rusqlite::params![task_id, upstream_id, offset, self.now_str()],
        )?;
        info!(task_id, upstream_id, offset, "dependency registered");
        Ok(Dependency {
            task_id,
            upstream_id,
            offset,
        })
    }

    pub fn deregister_dependency(&self, task_id: TaskId, upstream_id: TaskId) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM task_dependencies WHERE task_id = ?1 AND upstream_id = ?2",
            [task_id, upstream_id],
        )?;
        if n == 0 {
            return Err(SchedulerError::DependencyNotFound {
                task_id,
                upstream_id,
            });
        }
        info!(task_id, upstream_id, "dependency removed");
        Ok(())
    }

    pub fn dependencies_of(&self, task_id: TaskId) -> Result<Vec<Dependency>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT task_id, upstream_id, dependency_offset FROM task_dependencies
             WHERE task_id = ?1 ORDER BY upstream_id",
        )?;
        let deps = stmt
            .query_map([task_id], |row| {
                Ok(Dependency {
                    task_id: row.get(0)?,
                    upstream_id: row.get(1)?,
                    offset: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(deps)
    }

    /// True when `to` is reachable from `from` by following upstream edges.
    fn reaches(&self, from: TaskId, to: TaskId) -> Result<bool> {
        let mut stack = vec![from];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return Ok(true);
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.dependencies_of(current)?.into_iter().map(|d| d.upstream_id));
        }
        Ok(false)
    }

    // --- ledger inspection ---------------------------------------------------

    /// Every ledger row for `(task_id, project_id)`, oldest delta first.
    pub fn execution_records(
        &self,
        task_id: TaskId,
        project_id: ProjectId,
    ) -> Result<Vec<ExecutionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, project_id, delta, began_at, completed_at FROM task_executions
             WHERE task_id = ?1 AND project_id = ?2 ORDER BY delta",
        )?;
        let records = stmt
            .query_map([task_id, project_id], |row| {
                Ok(ExecutionRecord {
                    task_id: row.get(0)?,
                    project_id: row.get(1)?,
                    delta: row.get(2)?,
                    began_at: row.get(3)?,
                    completed_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Completed deltas of `(task_id, project_id)` in `[from, to]`.
    pub fn completed_deltas(
        &self,
        task_id: TaskId,
        project_id: ProjectId,
        from: Delta,
        to: Delta,
    ) -> Result<HashSet<Delta>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT delta FROM task_executions
             WHERE task_id = ?1 AND project_id = ?2 AND completed_at IS NOT NULL
               AND delta >= ?3 AND delta <= ?4",
        )?;
        let done = stmt
            .query_map(rusqlite::params![task_id, project_id, from, to], |row| {
                row.get::<_, Delta>(0)
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(done)
    }

    /// Whether `upstream` finished everything `task`'s period at `delta`
    /// (shifted by `offset` periods) depends on.
    fn upstream_done(
        &self,
        task: &Task,
        upstream: &Task,
        project_id: ProjectId,
        delta: Delta,
        offset: i32,
    ) -> Result<bool> {
        let shifted_start = task
            .frequency
            .shift(start_of(delta)?, i64::from(offset))
            .ok_or_else(|| SchedulerError::invalid_delta(delta, "dependency offset overflows"))?;
        let shifted = Delta::from_datetime(shifted_start);
        let upstream_project = upstream.ledger_project(project_id);

        if upstream.frequency == task.frequency {
            let done = self.completed_deltas(upstream.id, upstream_project, shifted, shifted)?;
            return Ok(done.contains(&shifted));
        }
        if !upstream.frequency.is_finer_than(task.frequency) {
            debug!(
                task = %task.name,
                upstream = %upstream.name,
                "upstream runs less often than its dependant; never satisfied"
            );
            return Ok(false);
        }

        let shifted_end = end_of(shifted, task.frequency, task.frequency_interval)?;
        let expected: Vec<Delta> = deltas_between(upstream, shifted_start, shifted_end)
            .into_iter()
            .filter(|d| *d >= shifted)
            .collect();
        let (Some(&first), Some(&last)) = (expected.first(), expected.last()) else {
            return Ok(true);
        };
        let done = self.completed_deltas(upstream.id, upstream_project, first, last)?;
        Ok(expected.iter().all(|d| done.contains(d)))
    }
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let frequency: String = row.get(2)?;
    let frequency: Frequency = frequency
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        frequency,
        frequency_interval: row.get(3)?,
        skip_start_index: row.get(4)?,
        skip_end_index: row.get(5)?,
        recurrence: row.get(6)?,
        offset_start_minutes: row.get(7)?,
        is_project_scoped: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl TaskRegistry for SqliteStore {
    fn resolve_task(&self, name: &str) -> Result<Option<Task>> {
        self.get_task_by_name(name)
    }
}

impl DeltaEnumerator for SqliteStore {
    fn due_deltas(&self, task: &Task, project_id: ProjectId, lookback: u32) -> Result<Vec<Delta>> {
        let configured = configured_deltas(task, lookback, (self.now)());
        let (Some(&first), Some(&last)) = (configured.first(), configured.last()) else {
            return Ok(Vec::new());
        };
        let done = self.completed_deltas(task.id, task.ledger_project(project_id), first, last)?;
        let due: Vec<Delta> = configured
            .into_iter()
            .filter(|d| !done.contains(d))
            .collect();
        debug!(task = %task.name, project_id, due = due.len(), completed = done.len(), "due deltas computed");
        Ok(due)
    }
}

impl DependencyGate for SqliteStore {
    fn is_dependency_satisfied(
        &self,
        task: &Task,
        project_id: ProjectId,
        delta: Delta,
    ) -> Result<bool> {
        for dep in self.dependencies_of(task.id)? {
            let upstream = self
                .get_task_by_id(dep.upstream_id)?
                .ok_or_else(|| SchedulerError::TaskNotFound {
                    name: format!("#{}", dep.upstream_id),
                })?;
            if !self.upstream_done(task, &upstream, project_id, delta, dep.offset)? {
                debug!(task = %task.name, upstream = %upstream.name, project_id, %delta, "upstream not done");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl ExecutionLedger for SqliteStore {
    fn begin(&self, task_id: TaskId, project_id: ProjectId, delta: Delta) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO task_executions (task_id, project_id, delta, began_at, completed_at)
             VALUES (?1,?2,?3,?4,NULL)
             ON CONFLICT(task_id, project_id, delta)
             DO UPDATE SET began_at = excluded.began_at, completed_at = NULL",
            rusqlite::params![task_id, project_id, delta, self.now_str()],
        )?;
        Ok(())
    }

    fn complete(&self, task_id: TaskId, project_id: ProjectId, delta: Delta) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO task_executions (task_id, project_id, delta, began_at, completed_at)
             VALUES (?1,?2,?3,?4,?4)
             ON CONFLICT(task_id, project_id, delta)
             DO UPDATE SET completed_at = excluded.completed_at",
            rusqlite::params![task_id, project_id, delta, self.now_str()],
        )?;
        Ok(())
    }

    fn delete_complete(&self, task_id: TaskId, project_id: ProjectId, delta: Delta) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM task_executions WHERE task_id = ?1 AND project_id = ?2 AND delta = ?3",
            rusqlite::params![task_id, project_id, delta],
        )?;
        debug!(task_id, project_id, %delta, removed = n, "execution record cleared");
        Ok(())
    }
}
