use rusqlite::Connection;

use crate::error::Result;

/// Initialise the task store schema in `conn`.
///
/// Creates the `tasks` and `executions` tables (idempotent). The task body is
/// stored as JSON so new model fields need no migration; `name` and `backend`
/// are duplicated into columns for listing and filtering.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id          TEXT    NOT NULL PRIMARY KEY,
            name        TEXT    NOT NULL,
            backend     TEXT    NOT NULL,
            body        TEXT    NOT NULL,   -- JSON-encoded ScheduledTask
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS executions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id     TEXT    NOT NULL,
            exit_code   INTEGER NOT NULL,
            stdout      TEXT    NOT NULL,
            stderr      TEXT    NOT NULL,
            duration_ms INTEGER NOT NULL,
            started_at  TEXT    NOT NULL    -- ISO-8601
        ) STRICT;

        -- History lookups: WHERE task_id = ? ORDER BY started_at DESC
        CREATE INDEX IF NOT EXISTS idx_executions_task ON executions (task_id, started_at);
        ",
    )?;
    Ok(())
}
