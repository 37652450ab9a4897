use thiserror::Error;

/// Errors that can occur within the schedule model and task store.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A task body could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No task with the given ID exists in the store.
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    /// Save-time validation failed; every violation is listed.
    #[error("Invalid task: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl ScheduleError {
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::Database(_) => "DATABASE_ERROR",
            ScheduleError::Serialization(_) => "SERIALIZATION_ERROR",
            ScheduleError::TaskNotFound { .. } => "TASK_NOT_FOUND",
            ScheduleError::Invalid(_) => "INVALID_TASK",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
