use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the task registry, dependency edges and the execution ledger
/// (idempotent). Ledger rows are unique per `(task_id, project_id, delta)`.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            task_id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name                 TEXT    NOT NULL UNIQUE,
            frequency            TEXT    NOT NULL,   -- hourly | daily | weekly | monthly | quarterly
            frequency_interval   INTEGER NOT NULL DEFAULT 1,
            skip_start_index     INTEGER NOT NULL DEFAULT 0,
            skip_end_index       INTEGER,            -- NULL means end of range
            recurrence           INTEGER NOT NULL DEFAULT 1,
            offset_start_minutes INTEGER NOT NULL DEFAULT 0,
            is_project_scoped    INTEGER NOT NULL DEFAULT 0,
            created_at           TEXT    NOT NULL,
            updated_at           TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS task_dependencies (
            task_id           INTEGER NOT NULL REFERENCES tasks (task_id),
            upstream_id       INTEGER NOT NULL REFERENCES tasks (task_id),
            dependency_offset INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT    NOT NULL,
            PRIMARY KEY (task_id, upstream_id)
        ) STRICT;

        CREATE TABLE IF NOT EXISTS task_executions (
            task_id      INTEGER NOT NULL REFERENCES tasks (task_id),
            project_id   INTEGER NOT NULL DEFAULT 0,   -- 0 for global tasks
            delta        INTEGER NOT NULL,             -- YYYYMMDDHH
            began_at     TEXT,
            completed_at TEXT,                         -- NULL means still due
            PRIMARY KEY (task_id, project_id, delta)
        ) STRICT;

        -- Due-delta and dependency lookups: WHERE task_id = ? AND project_id = ?
        -- AND completed_at IS NOT NULL AND delta BETWEEN ? AND ?
        CREATE INDEX IF NOT EXISTS idx_task_executions_completed
            ON task_executions (task_id, project_id, completed_at, delta);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('tasks', 'task_dependencies', 'task_executions')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }
}
