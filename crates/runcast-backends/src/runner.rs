//! External tool execution.
//!
//! Every adapter reaches the OS through a [`ToolRunner`], so adapter logic can
//! be exercised against a recording fake while production uses
//! [`ProcessRunner`].

use std::{path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use runcast_core::config::ExecutionConfig;
use runcast_schedule::ExecutionResult;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, warn};

use crate::{
    error::{BackendError, Result},
    truncate,
};

/// One external command: program, argv, optional stdin and a time budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub working_directory: Option<String>,
    pub timeout_secs: u64,
}

impl Invocation {
    /// Default budget for bookkeeping calls (`crontab -l`, `launchctl list`, ...).
    pub const TOOL_TIMEOUT_SECS: u64 = 60;

    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
            working_directory: None,
            timeout_secs: Self::TOOL_TIMEOUT_SECS,
        }
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn in_directory(mut self, dir: Option<String>) -> Self {
        self.working_directory = dir;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Shell-ish rendering for log lines only.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs an [`Invocation`] to completion.
///
/// A non-zero exit is reported in the returned [`ExecutionResult`], not as an
/// error; errors mean the command could not run or overran its budget.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<ExecutionResult>;
}

/// Check that `program` resolves to an executable, either as a path or via
/// `PATH` lookup.
pub fn require_tool(program: &str) -> Result<()> {
    if program.contains('/') {
        if Path::new(program).is_file() {
            return Ok(());
        }
        return Err(BackendError::ToolNotAvailable(format!("{program} does not exist")));
    }
    which::which(program)
        .map(|_| ())
        .map_err(|e| BackendError::ToolNotAvailable(format!("{program}: {e}")))
}

/// Real subprocess runner on `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    max_output_chars: usize,
}

impl ProcessRunner {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            max_output_chars: config.max_output_chars,
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        require_tool(&invocation.program)?;
        debug!(command = %invocation.display(), timeout_secs = invocation.timeout_secs, "exec");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.working_directory {
            command.current_dir(dir);
        }

        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                BackendError::ToolNotAvailable(format!("{}: {e}", invocation.program))
            }
            std::io::ErrorKind::PermissionDenied => {
                BackendError::PermissionDenied(format!("{}: {e}", invocation.program))
            }
            _ => BackendError::CommandFailed(format!("spawn {} failed: {e}", invocation.program)),
        })?;

        // Fed from its own task so that a child which never reads its input
        // still falls under the timeout below. The pipe closes (EOF) when the
        // task ends.
        if let (Some(input), Some(mut stdin)) = (invocation.stdin.clone(), child.stdin.take()) {
            let program = invocation.program.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(%program, "stdin not fully consumed: {e}");
                }
            });
        }

        // `wait_with_output` consumes the child, so it runs on its own task;
        // the pid is kept for SIGKILL on the timeout path.
        let pid = child.id();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(child.wait_with_output().await);
        });

        let budget = Duration::from_secs(invocation.timeout_secs);
        match tokio::time::timeout(budget, rx).await {
            Ok(Ok(Ok(output))) => Ok(ExecutionResult {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: truncate::clip(&strip_text(&output.stdout), self.max_output_chars),
                stderr: truncate::clip(&strip_text(&output.stderr), self.max_output_chars),
                duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
                started_at,
            }),
            Ok(Ok(Err(e))) => Err(e.into()),
            Ok(Err(_)) => Err(BackendError::CommandFailed(format!(
                "{}: wait task ended unexpectedly",
                invocation.program
            ))),
            Err(_) => {
                if let Some(raw_pid) = pid {
                    // Safety: raw_pid is our direct child and has not been reaped.
                    #[cfg(unix)]
                    unsafe {
                        libc::kill(raw_pid as libc::pid_t, libc::SIGKILL);
                    }
                    #[cfg(not(unix))]
                    {
                        let _ = std::process::Command::new("taskkill")
                            .args(["/F", "/PID", &raw_pid.to_string()])
                            .output();
                    }
                }
                warn!(command = %invocation.display(), "killed after {}s", invocation.timeout_secs);
                Err(BackendError::CommandFailed(format!(
                    "{} timed out after {}s",
                    invocation.program, invocation.timeout_secs
                )))
            }
        }
    }
}

fn strip_text(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).into_owned()
}
