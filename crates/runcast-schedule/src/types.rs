use chrono::{DateTime, Utc};
use runcast_container::ContainerInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::cron::CronExpression;

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Stable task identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Fresh identifier (UUIDv7, time-sortable).
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Deterministic identifier for a human-readable label: the same label
    /// always yields the same id (UUIDv5 in the OID namespace).
    pub fn from_label(label: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, label.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// BackendKind / TaskStatus
// ---------------------------------------------------------------------------

/// Which OS facility a task is projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Calendar/interval daemon manager (launchd agents).
    Launchd,
    /// Per-user cron table.
    Cron,
    /// Container runtime (docker-compatible CLI).
    Container,
    /// Virtual machine runtime.
    Vm,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Launchd,
        BackendKind::Cron,
        BackendKind::Container,
        BackendKind::Vm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Launchd => "launchd",
            BackendKind::Cron => "cron",
            BackendKind::Container => "container",
            BackendKind::Vm => "vm",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "launchd" => Ok(BackendKind::Launchd),
            "cron" => Ok(BackendKind::Cron),
            "container" | "docker" => Ok(BackendKind::Container),
            "vm" => Ok(BackendKind::Vm),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Enabled,
    Disabled,
    Running,
    Error,
}

impl TaskStatus {
    /// Whether the backend artifact should be active after an install/update.
    pub fn is_enabled(&self) -> bool {
        matches!(self, TaskStatus::Enabled | TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Enabled => "enabled",
            TaskStatus::Disabled => "disabled",
            TaskStatus::Running => "running",
            TaskStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

pub const SHELL: &str = "/bin/sh";
pub const OSASCRIPT: &str = "/usr/bin/osascript";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Executable,
    ShellScript,
    AppleScript,
}

/// What a task runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Inline script body; takes precedence over `path` for script kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl Action {
    pub fn executable(path: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            kind: ActionKind::Executable,
            path: path.into(),
            arguments,
            working_directory: None,
            script: None,
        }
    }

    pub fn shell_inline(script: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::ShellScript,
            path: String::new(),
            arguments: Vec::new(),
            working_directory: None,
            script: Some(script.into()),
        }
    }

    pub fn apple_script_inline(script: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::AppleScript,
            path: String::new(),
            arguments: Vec::new(),
            working_directory: None,
            script: Some(script.into()),
        }
    }

    pub fn in_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    fn inline_script(&self) -> Option<&str> {
        self.script.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// The argv the OS scheduler launches.
    pub fn command_line(&self) -> Vec<String> {
        let interpreter = match self.kind {
            ActionKind::Executable => {
                let mut argv = vec![self.path.clone()];
                argv.extend(self.arguments.iter().cloned());
                return argv;
            }
            ActionKind::ShellScript => (SHELL, "-c"),
            ActionKind::AppleScript => (OSASCRIPT, "-e"),
        };

        match self.inline_script() {
            Some(script) => vec![
                interpreter.0.to_string(),
                interpreter.1.to_string(),
                script.to_string(),
            ],
            None => {
                let mut argv = vec![interpreter.0.to_string(), self.path.clone()];
                argv.extend(self.arguments.iter().cloned());
                argv
            }
        }
    }

    /// Inverse of [`Action::command_line`], used by discovery.
    pub fn from_command_line(argv: &[String], working_directory: Option<String>) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        let (kind, inline_flag) = match program.as_str() {
            SHELL => (ActionKind::ShellScript, "-c"),
            OSASCRIPT => (ActionKind::AppleScript, "-e"),
            _ => {
                return Some(Self {
                    working_directory,
                    ..Self::executable(program.clone(), rest.to_vec())
                });
            }
        };

        let action = match rest {
            [flag, script, ..] if flag == inline_flag => Self {
                kind,
                path: String::new(),
                arguments: Vec::new(),
                working_directory,
                script: Some(script.clone()),
            },
            [path, arguments @ ..] => Self {
                kind,
                path: path.clone(),
                arguments: arguments.to_vec(),
                working_directory,
                script: None,
            },
            [] => return None,
        };
        Some(action)
    }

    /// Strict check of the action invariant; one message per violation.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match self.kind {
            ActionKind::Executable if self.path.trim().is_empty() => {
                errors.push("executable path must not be empty".to_string());
            }
            ActionKind::ShellScript | ActionKind::AppleScript
                if self.path.trim().is_empty() && self.inline_script().is_none() =>
            {
                errors.push("script action needs a path or inline script content".to_string());
            }
            _ => {}
        }

        if self.path.contains('\0') {
            errors.push("action path contains a null byte".to_string());
        }
        if self.arguments.iter().any(|a| a.contains('\0')) {
            errors.push("action arguments contain a null byte".to_string());
        }
        if self.working_directory.as_deref().is_some_and(|d| d.contains('\0')) {
            errors.push("working directory contains a null byte".to_string());
        }
        if self.script.as_deref().is_some_and(|s| s.contains('\0')) {
            errors.push("inline script contains a null byte".to_string());
        }
        errors
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Calendar fields; `None` means "every value".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarSchedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,
    /// Day of month, 1–31.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u8>,
    /// 0 = Sunday … 6 = Saturday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<u8>,
    /// 1 = January … 12 = December.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u8>,
}

impl CalendarSchedule {
    /// Every day at `hour:minute`.
    pub fn daily(hour: u8, minute: u8) -> Self {
        Self {
            minute: Some(minute),
            hour: Some(hour),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let checks = [
            ("minute", self.minute, 0, 59),
            ("hour", self.hour, 0, 23),
            ("day", self.day, 1, 31),
            ("weekday", self.weekday, 0, 6),
            ("month", self.month, 1, 12),
        ];
        checks
            .into_iter()
            .filter_map(|(name, value, lo, hi)| {
                let v = value?;
                (v < lo || v > hi).then(|| format!("{name}: value {v} out of range {lo}-{hi}"))
            })
            .collect()
    }
}

/// When a task runs. Only `Calendar` and `Interval` carry data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Calendar(CalendarSchedule),
    Interval { seconds: u64 },
    AtLogin,
    AtStartup,
    OnDemand,
}

impl Trigger {
    /// Short human-readable summary for list views.
    pub fn describe(&self) -> String {
        match self {
            Trigger::Calendar(schedule) => CronExpression::from(*schedule).describe(),
            Trigger::Interval { seconds } => describe_interval(*seconds),
            Trigger::AtLogin => "At login".to_string(),
            Trigger::AtStartup => "At startup".to_string(),
            Trigger::OnDemand => "On demand".to_string(),
        }
    }
}

fn describe_interval(seconds: u64) -> String {
    let (n, unit) = match seconds {
        s if s > 0 && s % 3_600 == 0 => (s / 3_600, "hour"),
        s if s > 0 && s % 60 == 0 => (s / 60, "minute"),
        s => (s, "second"),
    };
    if n == 1 {
        format!("Every {unit}")
    } else {
        format!("Every {n} {unit}s")
    }
}

// ---------------------------------------------------------------------------
// VM metadata / execution results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    pub vm_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gib: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_gib: Option<u32>,
    /// Read-only, filled in by discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Outcome of an out-of-band `run_now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

// ---------------------------------------------------------------------------
// ScheduledTask
// ---------------------------------------------------------------------------

/// A task definition and the backend it is projected onto.
///
/// Edits rebuild the whole value (`with_*` consume `self` and bump
/// `modified_at`); nothing mutates a stored task in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub backend: BackendKind,
    pub action: Action,
    pub trigger: Trigger,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub read_only: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmInfo>,
}

impl ScheduledTask {
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
        backend: BackendKind,
        action: Action,
        trigger: Trigger,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: String::new(),
            backend,
            action,
            trigger,
            status: TaskStatus::Enabled,
            read_only: false,
            created_at: now,
            modified_at: now,
            container: None,
            vm: None,
        }
    }

    fn touched(mut self) -> Self {
        self.modified_at = Utc::now();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self.touched()
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self.touched()
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self.touched()
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self.touched()
    }

    /// Attach container metadata, dropping any VM metadata.
    pub fn with_container(mut self, info: ContainerInfo) -> Self {
        self.container = Some(info);
        self.vm = None;
        self.touched()
    }

    /// Attach VM metadata, dropping any container metadata.
    pub fn with_vm(mut self, info: VmInfo) -> Self {
        self.vm = Some(info);
        self.container = None;
        self.touched()
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}
