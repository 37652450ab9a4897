//! launchd user agents.
//!
//! Each task becomes `<label_prefix>.<task-id>.plist` in the agents
//! directory. Descriptors are written as XML property lists and read back
//! through `plutil -convert json`, which accepts XML and binary plists alike.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use runcast_core::config::{ExecutionConfig, LaunchdConfig};
use runcast_schedule::{
    Action, BackendKind, CalendarSchedule, ExecutionResult, ScheduledTask, TaskId, TaskStatus,
    Trigger,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    adapter::{check_task, run_action_directly, BackendAdapter},
    atomic::write_atomic,
    error::{BackendError, Result},
    runner::{Invocation, ToolRunner},
};

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// The launchd keys this system reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentDescriptor {
    pub label: String,
    /// Ignored by launchd; carries the task name.
    #[serde(default)]
    pub service_description: Option<String>,
    #[serde(default)]
    pub program_arguments: Vec<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub start_calendar_interval: Option<CalendarInterval>,
    #[serde(default)]
    pub start_interval: Option<u64>,
    #[serde(default)]
    pub run_at_load: bool,
    #[serde(default)]
    pub launch_only_once: bool,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CalendarInterval {
    #[serde(default)]
    pub minute: Option<u8>,
    #[serde(default)]
    pub hour: Option<u8>,
    #[serde(default)]
    pub day: Option<u8>,
    #[serde(default)]
    pub weekday: Option<u8>,
    #[serde(default)]
    pub month: Option<u8>,
}

impl From<CalendarSchedule> for CalendarInterval {
    fn from(s: CalendarSchedule) -> Self {
        Self {
            minute: s.minute,
            hour: s.hour,
            day: s.day,
            weekday: s.weekday,
            month: s.month,
        }
    }
}

impl From<CalendarInterval> for CalendarSchedule {
    fn from(c: CalendarInterval) -> Self {
        Self {
            minute: c.minute,
            hour: c.hour,
            day: c.day,
            // launchd accepts 7 for Sunday as well as 0.
            weekday: c.weekday.map(|d| d % 7),
            month: c.month,
        }
    }
}

impl AgentDescriptor {
    pub fn from_task(task: &ScheduledTask, label: String) -> Self {
        let mut descriptor = Self {
            label,
            service_description: Some(task.name.clone()),
            program_arguments: task.action.command_line(),
            working_directory: task.action.working_directory.clone(),
            disabled: !task.status.is_enabled(),
            ..Default::default()
        };
        match &task.trigger {
            Trigger::Calendar(schedule) => {
                descriptor.start_calendar_interval = Some((*schedule).into());
            }
            Trigger::Interval { seconds } => descriptor.start_interval = Some(*seconds),
            Trigger::AtLogin => descriptor.run_at_load = true,
            Trigger::AtStartup => {
                descriptor.run_at_load = true;
                descriptor.launch_only_once = true;
            }
            Trigger::OnDemand => {}
        }
        descriptor
    }

    /// Rebuild the task, or `None` if the label is not ours or the program
    /// arguments are empty.
    pub fn to_task(&self, label_prefix: &str) -> Option<ScheduledTask> {
        let id = self
            .label
            .strip_prefix(label_prefix)?
            .strip_prefix('.')
            .filter(|id| !id.is_empty())?;
        let action =
            Action::from_command_line(&self.program_arguments, self.working_directory.clone())?;

        let trigger = if let Some(interval) = self.start_calendar_interval {
            Trigger::Calendar(interval.into())
        } else if let Some(seconds) = self.start_interval {
            Trigger::Interval { seconds }
        } else if self.run_at_load && self.launch_only_once {
            Trigger::AtStartup
        } else if self.run_at_load {
            Trigger::AtLogin
        } else {
            Trigger::OnDemand
        };

        let name = self
            .service_description
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id.to_string());
        let status = if self.disabled {
            TaskStatus::Disabled
        } else {
            TaskStatus::Enabled
        };

        Some(
            ScheduledTask::new(TaskId::from(id), name, BackendKind::Launchd, action, trigger)
                .with_status(status),
        )
    }

    /// Render as an XML property list.
    pub fn to_xml(&self) -> String {
        let mut out = String::from(concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
            "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
            "<plist version=\"1.0\">\n<dict>\n",
        ));

        push_string(&mut out, "Label", &self.label);
        if let Some(name) = &self.service_description {
            push_string(&mut out, "ServiceDescription", name);
        }

        push_key(&mut out, 1, "ProgramArguments");
        out.push_str("\t<array>\n");
        for arg in &self.program_arguments {
            let _ = writeln!(out, "\t\t<string>{}</string>", escape_xml(arg));
        }
        out.push_str("\t</array>\n");

        if let Some(dir) = &self.working_directory {
            push_string(&mut out, "WorkingDirectory", dir);
        }
        if let Some(cal) = &self.start_calendar_interval {
            push_key(&mut out, 1, "StartCalendarInterval");
            out.push_str("\t<dict>\n");
            let fields = [
                ("Minute", cal.minute),
                ("Hour", cal.hour),
                ("Day", cal.day),
                ("Weekday", cal.weekday),
                ("Month", cal.month),
            ];
            for (key, value) in fields {
                if let Some(v) = value {
                    push_key(&mut out, 2, key);
                    let _ = writeln!(out, "\t\t<integer>{v}</integer>");
                }
            }
            out.push_str("\t</dict>\n");
        }
        if let Some(seconds) = self.start_interval {
            push_key(&mut out, 1, "StartInterval");
            let _ = writeln!(out, "\t<integer>{seconds}</integer>");
        }
        if self.run_at_load {
            push_bool(&mut out, "RunAtLoad", true);
        }
        if self.launch_only_once {
            push_bool(&mut out, "LaunchOnlyOnce", true);
        }
        push_bool(&mut out, "Disabled", self.disabled);

        out.push_str("</dict>\n</plist>\n");
        out
    }
}

fn push_key(out: &mut String, depth: usize, key: &str) {
    let _ = writeln!(out, "{}<key>{key}</key>", "\t".repeat(depth));
}

fn push_string(out: &mut String, key: &str, value: &str) {
    push_key(out, 1, key);
    let _ = writeln!(out, "\t<string>{}</string>", escape_xml(value));
}

fn push_bool(out: &mut String, key: &str, value: bool) {
    push_key(out, 1, key);
    out.push_str(if value { "\t<true/>\n" } else { "\t<false/>\n" });
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Extract the pid from `launchctl list <label>` output (`"PID" = 123;`).
pub fn parse_pid(list_output: &str) -> Option<u32> {
    list_output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("\"PID\"")?;
        let value = rest.trim_start().strip_prefix('=')?;
        value.trim().trim_end_matches(';').trim().parse().ok()
    })
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct LaunchdAdapter {
    config: LaunchdConfig,
    execution: ExecutionConfig,
    runner: Arc<dyn ToolRunner>,
}

impl LaunchdAdapter {
    pub fn new(config: LaunchdConfig, execution: ExecutionConfig, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            config,
            execution,
            runner,
        }
    }

    pub fn label(&self, task: &ScheduledTask) -> String {
        format!("{}.{}", self.config.label_prefix, task.id)
    }

    pub fn descriptor_path(&self, task: &ScheduledTask) -> PathBuf {
        Path::new(&self.config.agents_dir).join(format!("{}.plist", self.label(task)))
    }

    async fn launchctl(&self, args: &[&str]) -> Result<ExecutionResult> {
        self.runner
            .run(&Invocation::new(self.config.launchctl.clone(), args.iter().copied()))
            .await
    }

    /// `launchctl load`/`unload` report some failures on stderr with exit 0.
    async fn load_or_unload(&self, verb: &str, path: &Path) -> Result<()> {
        let path = path.to_string_lossy().into_owned();
        let result = self.launchctl(&[verb, "-w", path.as_str()]).await?;
        let reported_failure = result.stderr.to_lowercase().contains("failed");
        if !result.succeeded() || reported_failure {
            return Err(BackendError::from_exit(
                &result,
                &format!("launchctl {verb} {path}"),
                BackendError::LoadFailed,
            ));
        }
        Ok(())
    }

    async fn loaded_pid(&self, label: &str) -> Result<Option<u32>> {
        let result = self.launchctl(&["list", label]).await?;
        if !result.succeeded() {
            return Ok(None);
        }
        Ok(parse_pid(&result.stdout))
    }

    /// Write the task's descriptor with the given `Disabled` flag, so that
    /// discovery sees the state the last enable or disable left behind.
    fn write_descriptor(&self, task: &ScheduledTask, disabled: bool) -> Result<()> {
        let descriptor = AgentDescriptor {
            disabled,
            ..AgentDescriptor::from_task(task, self.label(task))
        };
        let path = self.descriptor_path(task);
        write_atomic(&path, descriptor.to_xml().as_bytes())?;
        info!(task_id = %task.id, path = %path.display(), disabled, "launchd descriptor written");
        Ok(())
    }

    async fn read_descriptor(&self, path: &Path) -> Result<AgentDescriptor> {
        let path_str = path.to_string_lossy();
        let result = self
            .runner
            .run(&Invocation::new(
                self.config.plutil.clone(),
                ["-convert", "json", "-o", "-", &*path_str],
            ))
            .await?;
        if !result.succeeded() {
            return Err(BackendError::from_exit(
                &result,
                &format!("plutil {path_str}"),
                BackendError::CommandFailed,
            ));
        }
        serde_json::from_str(&result.stdout)
            .map_err(|e| BackendError::CommandFailed(format!("{path_str}: {e}")))
    }
}

#[async_trait]
impl BackendAdapter for LaunchdAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Launchd
    }

    async fn install(&self, task: &ScheduledTask) -> Result<()> {
        check_task(BackendKind::Launchd, task)?;
        tokio::fs::create_dir_all(&self.config.agents_dir).await?;
        self.write_descriptor(task, !task.status.is_enabled())
            .map_err(|e| match e {
                BackendError::FileSystem(msg) => BackendError::ArtifactCreation(msg),
                other => other,
            })
    }

    async fn uninstall(&self, task: &ScheduledTask) -> Result<()> {
        let path = self.descriptor_path(task);
        if !tokio::fs::try_exists(&path).await? {
            debug!(task_id = %task.id, "no descriptor to remove");
            return Ok(());
        }
        // Unloading an agent that is not loaded fails; the file still goes.
        if let Err(e) = self.load_or_unload("unload", &path).await {
            debug!(task_id = %task.id, "unload before removal: {e}");
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(task_id = %task.id, path = %path.display(), "launchd descriptor removed");
        Ok(())
    }

    async fn enable(&self, task: &ScheduledTask) -> Result<()> {
        let path = self.descriptor_path(task);
        if !tokio::fs::try_exists(&path).await? {
            return Err(BackendError::LoadFailed(format!(
                "{} is not installed",
                path.display()
            )));
        }
        self.write_descriptor(task, false)?;
        self.load_or_unload("load", &path).await?;
        info!(task_id = %task.id, "launchd agent loaded");
        Ok(())
    }

    async fn disable(&self, task: &ScheduledTask) -> Result<()> {
        let path = self.descriptor_path(task);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        self.load_or_unload("unload", &path).await?;
        self.write_descriptor(task, true)?;
        info!(task_id = %task.id, "launchd agent unloaded");
        Ok(())
    }

    async fn run_now(&self, task: &ScheduledTask) -> Result<ExecutionResult> {
        run_action_directly(self.runner.as_ref(), &self.execution, task).await
    }

    async fn is_installed(&self, task: &ScheduledTask) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.descriptor_path(task)).await?)
    }

    async fn is_running(&self, task: &ScheduledTask) -> Result<bool> {
        Ok(self.loaded_pid(&self.label(task)).await?.is_some())
    }

    async fn discover_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let mut entries = match tokio::fs::read_dir(&self.config.agents_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let ours = format!("{}.", self.config.label_prefix);
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with(&ours) && file_name.ends_with(".plist") {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut tasks = Vec::new();
        for path in paths {
            let descriptor = match self.read_descriptor(&path).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(path = %path.display(), "unreadable descriptor skipped: {e}");
                    continue;
                }
            };
            let Some(mut task) = descriptor.to_task(&self.config.label_prefix) else {
                debug!(path = %path.display(), "descriptor not recognised");
                continue;
            };
            if !descriptor.disabled && self.loaded_pid(&descriptor.label).await?.is_some() {
                task.status = TaskStatus::Running;
            }
            tasks.push(task);
        }
        info!(count = tasks.len(), "launchd discovery");
        Ok(tasks)
    }
}
