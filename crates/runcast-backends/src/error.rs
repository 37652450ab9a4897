//! Error types for backend adapters.

use runcast_schedule::ExecutionResult;
use thiserror::Error;

/// Closed set of failures an adapter operation can report.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The descriptor, cron line, container or VM could not be created.
    #[error("Artifact creation failed: {0}")]
    ArtifactCreation(String),

    /// The OS facility refused to load/unload or start/stop the artifact.
    #[error("Load/unload failed: {0}")]
    LoadFailed(String),

    /// An external tool ran but failed, or exceeded its time budget.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Reading or writing a backend artifact on disk failed.
    #[error("File system error: {0}")]
    FileSystem(String),

    /// The backend's CLI is not installed or not on `PATH`.
    #[error("Tool not available: {0}")]
    ToolNotAvailable(String),

    /// The backend cannot express the requested task or operation.
    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl BackendError {
    /// Short error code string shown next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::ArtifactCreation(_) => "ARTIFACT_CREATION_FAILED",
            BackendError::LoadFailed(_) => "LOAD_FAILED",
            BackendError::CommandFailed(_) => "COMMAND_FAILED",
            BackendError::PermissionDenied(_) => "PERMISSION_DENIED",
            BackendError::FileSystem(_) => "FILE_SYSTEM_ERROR",
            BackendError::ToolNotAvailable(_) => "TOOL_NOT_AVAILABLE",
            BackendError::NotSupported(_) => "NOT_SUPPORTED",
        }
    }

    /// Turn a non-zero tool exit into an error of the given kind, unless the
    /// tool's stderr says the failure was a permission problem.
    pub(crate) fn from_exit(
        result: &ExecutionResult,
        context: &str,
        kind: fn(String) -> BackendError,
    ) -> Self {
        let stderr = result.stderr.trim();
        let message = if stderr.is_empty() {
            format!("{context} (exit {})", result.exit_code)
        } else {
            format!("{context} (exit {}): {stderr}", result.exit_code)
        };

        let lower = stderr.to_lowercase();
        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            BackendError::PermissionDenied(message)
        } else {
            kind(message)
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => BackendError::PermissionDenied(e.to_string()),
            _ => BackendError::FileSystem(e.to_string()),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, BackendError>;
