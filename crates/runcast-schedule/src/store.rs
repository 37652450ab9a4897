use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::{
    db::init_db,
    error::{Result, ScheduleError},
    types::{ExecutionResult, ScheduledTask, TaskId},
};

/// Persisted task list and execution history.
///
/// One store per connection; callers serialise mutations (a single writer
/// owns the task list).
pub struct TaskStore {
    conn: Connection,
}

impl TaskStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn })
    }

    /// Open (or create) the SQLite file at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    /// Insert or replace a task after strict validation.
    ///
    /// Returns [`ScheduleError::Invalid`] listing every violation; nothing is
    /// written in that case.
    pub fn save_task(&self, task: &ScheduledTask) -> Result<()> {
        let errors = task.validate();
        if !errors.is_empty() {
            return Err(ScheduleError::Invalid(errors));
        }

        let body = serde_json::to_string(task)?;
        self.conn.execute(
            "INSERT INTO tasks (id, name, backend, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                backend = excluded.backend,
                body = excluded.body,
                updated_at = excluded.updated_at",
            rusqlite::params![
                task.id.as_str(),
                task.name,
                task.backend.as_str(),
                body,
                task.created_at.to_rfc3339(),
                task.modified_at.to_rfc3339(),
            ],
        )?;
        info!(task_id = %task.id, name = %task.name, backend = %task.backend, "task saved");
        Ok(())
    }

    pub fn load_task(&self, id: &TaskId) -> Result<ScheduledTask> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM tasks WHERE id = ?1", [id.as_str()], |row| {
                row.get(0)
            })
            .optional()?;
        let body = body.ok_or_else(|| ScheduleError::TaskNotFound { id: id.to_string() })?;
        Ok(serde_json::from_str(&body)?)
    }

    /// All tasks ordered by creation time. Database errors propagate; a row
    /// whose JSON body no longer decodes (written by a newer model) is
    /// skipped with a warning.
    pub fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, body FROM tasks ORDER BY created_at, id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, body)| match serde_json::from_str(&body) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(task_id = %id, "undecodable task body skipped: {e}");
                    None
                }
            })
            .collect())
    }

    /// Remove a task and its history in one transaction. Returns
    /// `TaskNotFound` if no row is deleted.
    pub fn remove_task(&self, id: &TaskId) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let n = tx.execute("DELETE FROM tasks WHERE id = ?1", [id.as_str()])?;
        if n == 0 {
            return Err(ScheduleError::TaskNotFound { id: id.to_string() });
        }
        tx.execute("DELETE FROM executions WHERE task_id = ?1", [id.as_str()])?;
        tx.commit()?;
        info!(task_id = %id, "task removed");
        Ok(())
    }

    pub fn record_execution(&self, id: &TaskId, result: &ExecutionResult) -> Result<()> {
        self.conn.execute(
            "INSERT INTO executions (task_id, exit_code, stdout, stderr, duration_ms, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                id.as_str(),
                result.exit_code,
                result.stdout,
                result.stderr,
                i64::try_from(result.duration_ms).unwrap_or(i64::MAX),
                result
                    .started_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            ],
        )?;
        Ok(())
    }

    /// Most recent executions first, at most `limit` rows.
    pub fn history(&self, id: &TaskId, limit: usize) -> Result<Vec<ExecutionResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT exit_code, stdout, stderr, duration_ms, started_at
             FROM executions WHERE task_id = ?1
             ORDER BY started_at DESC, id DESC LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(rusqlite::params![id.as_str(), limit], |row| {
                let started_at: String = row.get(4)?;
                let started_at = DateTime::parse_from_rfc3339(&started_at)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc);
                Ok(ExecutionResult {
                    exit_code: row.get(0)?,
                    stdout: row.get(1)?,
                    stderr: row.get(2)?,
                    duration_ms: u64::try_from(row.get::<_, i64>(3)?).unwrap_or_default(),
                    started_at,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
