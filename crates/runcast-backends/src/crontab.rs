//! Per-user cron table.
//!
//! Each task occupies two lines: a marker comment naming it, then its
//! schedule line. Disabled tasks keep their line behind a `#off# ` prefix.
//! Lines without a marker belong to the user and are carried through every
//! rewrite untouched.
//!
//! ```text
//! # runcast:0191c6d2-... Nightly backup
//! 30 2 * * * /usr/local/bin/backup --full
//! # runcast:0191c6d3-... Sync
//! #off# */15 * * * * cd /srv && ./sync.sh
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use runcast_core::config::{CronConfig, ExecutionConfig};
use runcast_schedule::{
    Action, ActionKind, BackendKind, CronExpression, ExecutionResult, ScheduledTask, TaskId,
    TaskStatus, Trigger,
};
use tracing::{debug, info, warn};

use crate::{
    adapter::{check_task, run_action_directly, BackendAdapter},
    error::{BackendError, Result},
    runner::{Invocation, ToolRunner},
};

pub const MARKER: &str = "# runcast:";
pub const DISABLED_PREFIX: &str = "#off# ";

/// Attempts at the read-compare-write cycle before giving up.
const CAS_ATTEMPTS: usize = 3;

// ---------------------------------------------------------------------------
// Table model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronEntry {
    pub task_id: TaskId,
    pub name: String,
    /// Five cron fields joined by single spaces, or an `@` nickname.
    pub schedule: String,
    /// Shell command text exactly as it appears in the table.
    pub command: String,
    pub enabled: bool,
}

impl CronEntry {
    pub fn for_task(task: &ScheduledTask) -> Result<Self> {
        Ok(Self {
            task_id: task.id.clone(),
            name: task.name.clone(),
            schedule: schedule_for(&task.trigger)?,
            command: command_for(&task.action)?,
            enabled: task.status.is_enabled(),
        })
    }

    /// Rebuild the task, or `None` if the schedule or command is not
    /// something this system writes.
    pub fn to_task(&self) -> Option<ScheduledTask> {
        let trigger = trigger_for(&self.schedule)?;
        let action = action_for(&self.command)?;
        let name = if self.name.trim().is_empty() {
            self.task_id.to_string()
        } else {
            self.name.clone()
        };
        let status = if self.enabled {
            TaskStatus::Enabled
        } else {
            TaskStatus::Disabled
        };
        Some(
            ScheduledTask::new(self.task_id.clone(), name, BackendKind::Cron, action, trigger)
                .with_status(status),
        )
    }

    fn render(&self, out: &mut String) {
        let name = self.name.replace(['\n', '\r'], " ");
        out.push_str(&format!("{MARKER}{} {name}\n", self.task_id));
        if !self.enabled {
            out.push_str(DISABLED_PREFIX);
        }
        out.push_str(&format!("{} {}\n", self.schedule, self.command));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CronLine {
    Foreign(String),
    Entry(CronEntry),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CronTable {
    lines: Vec<CronLine>,
}

impl CronTable {
    /// A marker not followed by a readable schedule line is kept as a
    /// foreign comment.
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut iter = text.lines().peekable();
        while let Some(line) = iter.next() {
            if let Some((task_id, name)) = parse_marker(line) {
                if let Some(entry) = iter
                    .peek()
                    .and_then(|next| parse_schedule_line(next, task_id, name))
                {
                    iter.next();
                    lines.push(CronLine::Entry(entry));
                    continue;
                }
            }
            lines.push(CronLine::Foreign(line.to_string()));
        }
        Self { lines }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                CronLine::Foreign(text) => {
                    out.push_str(text);
                    out.push('\n');
                }
                CronLine::Entry(entry) => entry.render(&mut out),
            }
        }
        out
    }

    pub fn entries(&self) -> impl Iterator<Item = &CronEntry> {
        self.lines.iter().filter_map(|line| match line {
            CronLine::Entry(entry) => Some(entry),
            CronLine::Foreign(_) => None,
        })
    }

    pub fn entry(&self, id: &TaskId) -> Option<&CronEntry> {
        self.entries().find(|e| &e.task_id == id)
    }

    fn entry_mut(&mut self, id: &TaskId) -> Option<&mut CronEntry> {
        self.lines.iter_mut().find_map(|line| match line {
            CronLine::Entry(entry) if &entry.task_id == id => Some(entry),
            _ => None,
        })
    }

    /// Replace the task's entry in place, or append it. Returns `true` when
    /// the table changed.
    pub fn upsert(&mut self, entry: CronEntry) -> bool {
        match self.entry_mut(&entry.task_id) {
            Some(existing) if *existing == entry => false,
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                self.lines.push(CronLine::Entry(entry));
                true
            }
        }
    }

    pub fn remove(&mut self, id: &TaskId) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|line| !matches!(line, CronLine::Entry(e) if &e.task_id == id));
        self.lines.len() != before
    }

    /// `None` when the task has no entry, else whether anything changed.
    pub fn set_enabled(&mut self, id: &TaskId, enabled: bool) -> Option<bool> {
        let entry = self.entry_mut(id)?;
        let changed = entry.enabled != enabled;
        entry.enabled = enabled;
        Some(changed)
    }
}

fn parse_marker(line: &str) -> Option<(TaskId, String)> {
    let rest = line.strip_prefix(MARKER)?;
    let (id, name) = rest.split_once(' ').unwrap_or((rest, ""));
    if id.is_empty() {
        return None;
    }
    Some((TaskId::from(id), name.trim().to_string()))
}

fn parse_schedule_line(line: &str, task_id: TaskId, name: String) -> Option<CronEntry> {
    let (enabled, body) = match line.strip_prefix(DISABLED_PREFIX) {
        Some(rest) => (false, rest),
        None => (true, line),
    };
    let body = body.trim_start();
    if body.is_empty() || body.starts_with('#') {
        return None;
    }
    let field_count = if body.starts_with('@') { 1 } else { 5 };
    let (schedule, command) = split_leading_fields(body, field_count)?;
    if command.trim().is_empty() {
        return None;
    }
    Some(CronEntry {
        task_id,
        name,
        schedule,
        command: command.trim_end().to_string(),
        enabled,
    })
}

/// Split off `n` whitespace-separated fields, returning them joined by single
/// spaces plus the untouched remainder.
fn split_leading_fields(line: &str, n: usize) -> Option<(String, &str)> {
    let mut rest = line.trim_start();
    let mut fields = Vec::with_capacity(n);
    for _ in 0..n {
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Some((fields.join(" "), rest))
}

// ---------------------------------------------------------------------------
// Trigger and action encoding
// ---------------------------------------------------------------------------

/// Cron schedule text for a trigger.
pub fn schedule_for(trigger: &Trigger) -> Result<String> {
    match trigger {
        Trigger::Calendar(schedule) => Ok(CronExpression::from(*schedule).to_string()),
        Trigger::AtStartup => Ok("@reboot".to_string()),
        Trigger::Interval { seconds } => interval_schedule(*seconds).ok_or_else(|| {
            BackendError::NotSupported(format!(
                "cron cannot run every {seconds}s; use whole minutes dividing an hour or whole hours dividing a day"
            ))
        }),
        Trigger::AtLogin => Err(BackendError::NotSupported(
            "cron has no at-login trigger".to_string(),
        )),
        Trigger::OnDemand => Err(BackendError::NotSupported(
            "cron entries always carry a schedule".to_string(),
        )),
    }
}

/// Only intervals that tick evenly across the hour/day boundary are exact.
fn interval_schedule(seconds: u64) -> Option<String> {
    if seconds == 0 || seconds % 60 != 0 {
        return None;
    }
    let minutes = seconds / 60;
    if minutes < 60 && 60 % minutes == 0 {
        return Some(format!("*/{minutes} * * * *"));
    }
    if minutes % 60 == 0 {
        let hours = minutes / 60;
        if hours < 24 && 24 % hours == 0 {
            return Some(format!("0 */{hours} * * *"));
        }
    }
    None
}

/// Inverse of [`schedule_for`]. Calendar expressions that use lists, ranges
/// or steps narrow to the literal fields they contain.
pub fn trigger_for(schedule: &str) -> Option<Trigger> {
    if schedule == "@reboot" {
        return Some(Trigger::AtStartup);
    }
    let fields: Vec<&str> = schedule.split(' ').collect();
    match fields.as_slice() {
        [minute, "*", "*", "*", "*"] => {
            if let Some(n) = minute.strip_prefix("*/").and_then(|n| n.parse::<u64>().ok()) {
                return (n > 0).then_some(Trigger::Interval { seconds: n * 60 });
            }
        }
        ["0", hour, "*", "*", "*"] => {
            if let Some(n) = hour.strip_prefix("*/").and_then(|n| n.parse::<u64>().ok()) {
                return (n > 0).then_some(Trigger::Interval { seconds: n * 3_600 });
            }
        }
        _ => {}
    }

    let expr: CronExpression = schedule.parse().ok()?;
    if expr.is_lossy_for_calendar() {
        debug!(%schedule, "cron schedule narrowed to calendar fields");
    }
    Some(Trigger::Calendar(expr.to_calendar_schedule()))
}

/// Shell text for the schedule line. A table line cannot hold a line break,
/// so multi-line scripts and arguments are refused.
fn command_for(action: &Action) -> Result<String> {
    let words = action.command_line();
    let multi_line = words
        .iter()
        .chain(action.working_directory.iter())
        .any(|word| word.contains(['\n', '\r']));
    if multi_line {
        return Err(BackendError::NotSupported(
            "cron commands must fit on one line; save the script to a file instead".to_string(),
        ));
    }

    let argv = words
        .iter()
        .map(|word| quote_word(word))
        .collect::<Vec<_>>()
        .join(" ");
    let command = match &action.working_directory {
        Some(dir) => format!("cd {} && {argv}", quote_word(dir)),
        None => argv,
    };
    // cron turns a bare % into a newline
    Ok(command.replace('%', "\\%"))
}

fn action_for(command: &str) -> Option<Action> {
    let words = shell_split(&command.replace("\\%", "%"))?;
    match words.as_slice() {
        [cd, dir, and, argv @ ..] if cd == "cd" && and == "&&" => {
            Action::from_command_line(argv, Some(dir.clone()))
        }
        argv => Action::from_command_line(argv, None),
    }
}

fn quote_word(word: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "_-./=:,+@".contains(c);
    if !word.is_empty() && word.chars().all(safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', "'\\''"))
}

/// POSIX-style word splitting for the subset [`quote_word`] produces, plus
/// double quotes and backslash escapes in hand-edited lines. `None` on an
/// unterminated quote.
fn shell_split(text: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        c => current.push(c),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' => match chars.next()? {
                            c @ ('"' | '\\' | '$' | '`') => current.push(c),
                            c => {
                                current.push('\\');
                                current.push(c);
                            }
                        },
                        c => current.push(c),
                    }
                }
            }
            '\\' => {
                in_word = true;
                current.push(chars.next()?);
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct CronTableAdapter {
    config: CronConfig,
    execution: ExecutionConfig,
    runner: Arc<dyn ToolRunner>,
}

impl CronTableAdapter {
    pub fn new(config: CronConfig, execution: ExecutionConfig, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            config,
            execution,
            runner,
        }
    }

    /// Current table text; a user without a crontab has an empty one.
    pub async fn read_table(&self) -> Result<String> {
        let result = self
            .runner
            .run(&Invocation::new(self.config.binary.clone(), ["-l"]))
            .await?;
        if result.succeeded() {
            return Ok(result.stdout);
        }
        if result.stderr.to_lowercase().contains("no crontab") {
            return Ok(String::new());
        }
        Err(BackendError::from_exit(
            &result,
            "crontab -l",
            BackendError::CommandFailed,
        ))
    }

    async fn write_table(&self, text: &str) -> Result<()> {
        let result = self
            .runner
            .run(&Invocation::new(self.config.binary.clone(), ["-"]).with_stdin(text))
            .await?;
        if !result.succeeded() {
            return Err(BackendError::from_exit(
                &result,
                "crontab -",
                BackendError::ArtifactCreation,
            ));
        }
        Ok(())
    }

    /// Apply `edit` to the table and install the result, provided nobody
    /// rewrote the table in between. `edit` returns whether it changed
    /// anything; unchanged tables are not written.
    async fn modify<F>(&self, edit: F) -> Result<()>
    where
        F: Fn(&mut CronTable) -> Result<bool> + Send + Sync,
    {
        for attempt in 1..=CAS_ATTEMPTS {
            let snapshot = self.read_table().await?;
            let mut table = CronTable::parse(&snapshot);
            if !edit(&mut table)? {
                return Ok(());
            }

            let current = self.read_table().await?;
            if current != snapshot {
                warn!(attempt, "crontab changed while editing; retrying");
                continue;
            }
            return self.write_table(&table.render()).await;
        }
        Err(BackendError::CommandFailed(format!(
            "crontab kept changing; gave up after {CAS_ATTEMPTS} attempts"
        )))
    }
}

#[async_trait]
impl BackendAdapter for CronTableAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Cron
    }

    async fn install(&self, task: &ScheduledTask) -> Result<()> {
        check_task(BackendKind::Cron, task)?;
        let entry = CronEntry::for_task(task)?;
        debug!(task_id = %task.id, schedule = %entry.schedule, "cron entry");
        self.modify(|table| Ok(table.upsert(entry.clone()))).await?;
        info!(task_id = %task.id, "cron entry installed");
        Ok(())
    }

    async fn uninstall(&self, task: &ScheduledTask) -> Result<()> {
        self.modify(|table| Ok(table.remove(&task.id))).await?;
        info!(task_id = %task.id, "cron entry removed");
        Ok(())
    }

    async fn enable(&self, task: &ScheduledTask) -> Result<()> {
        self.modify(|table| {
            table.set_enabled(&task.id, true).ok_or_else(|| {
                BackendError::LoadFailed(format!("no crontab entry for task {}", task.id))
            })
        })
        .await?;
        info!(task_id = %task.id, "cron entry enabled");
        Ok(())
    }

    async fn disable(&self, task: &ScheduledTask) -> Result<()> {
        self.modify(|table| Ok(table.set_enabled(&task.id, false).unwrap_or(false)))
            .await?;
        info!(task_id = %task.id, "cron entry disabled");
        Ok(())
    }

    async fn run_now(&self, task: &ScheduledTask) -> Result<ExecutionResult> {
        run_action_directly(self.runner.as_ref(), &self.execution, task).await
    }

    async fn is_installed(&self, task: &ScheduledTask) -> Result<bool> {
        Ok(CronTable::parse(&self.read_table().await?)
            .entry(&task.id)
            .is_some())
    }

    /// cron keeps no process table; look for the action's program instead.
    async fn is_running(&self, task: &ScheduledTask) -> Result<bool> {
        let argv = task.action.command_line();
        let pattern = match task.action.kind {
            ActionKind::Executable => argv.first(),
            _ => argv.last(),
        };
        let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
            return Ok(false);
        };
        let result = self
            .runner
            .run(&Invocation::new("pgrep", ["-f", "--", pattern.as_str()]))
            .await?;
        Ok(result.succeeded())
    }

    async fn discover_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let table = CronTable::parse(&self.read_table().await?);
        let tasks: Vec<ScheduledTask> = table
            .entries()
            .filter_map(|entry| {
                let task = entry.to_task();
                if task.is_none() {
                    warn!(task_id = %entry.task_id, schedule = %entry.schedule, "cron entry not understood");
                }
                task
            })
            .collect();
        info!(count = tasks.len(), "cron discovery");
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use runcast_schedule::CalendarSchedule;

    use super::*;
    use crate::fake::{output, FakeRunner};

    const USER_TABLE: &str = "MAILTO=me@example.com\n# my own job\n0 * * * * /usr/bin/true\n";

    fn task() -> ScheduledTask {
        ScheduledTask::new(
            TaskId::from("t-1"),
            "Nightly backup",
            BackendKind::Cron,
            Action::executable("/usr/local/bin/backup", vec!["--full".into()]),
            Trigger::Calendar(CalendarSchedule::daily(2, 30)),
        )
    }

    /// A fake crontab: `-l` prints the shared table, `-` replaces it.
    fn crontab(initial: &str) -> (Arc<FakeRunner>, Arc<Mutex<String>>) {
        let table = Arc::new(Mutex::new(initial.to_string()));
        let shared = table.clone();
        let runner = FakeRunner::with(move |inv| {
            let mut table = shared.lock().unwrap();
            match inv.args.first().map(String::as_str) {
                Some("-l") if table.is_empty() => Ok(output(1, "", "crontab: no crontab for me")),
                Some("-l") => Ok(output(0, &table, "")),
                Some("-") => {
                    *table = inv.stdin.clone().unwrap_or_default();
                    Ok(output(0, "", ""))
                }
                _ => Ok(output(1, "", "unexpected")),
            }
        });
        (Arc::new(runner), table)
    }

    fn adapter(runner: Arc<FakeRunner>) -> CronTableAdapter {
        CronTableAdapter::new(CronConfig::default(), ExecutionConfig::default(), runner)
    }

    #[test]
    fn schedules() {
        let cal = Trigger::Calendar(CalendarSchedule {
            day: Some(15),
            ..CalendarSchedule::daily(9, 30)
        });
        assert_eq!(schedule_for(&cal).unwrap(), "30 9 15 * *");
        assert_eq!(schedule_for(&Trigger::AtStartup).unwrap(), "@reboot");
        assert_eq!(
            schedule_for(&Trigger::Interval { seconds: 900 }).unwrap(),
            "*/15 * * * *"
        );
        assert_eq!(
            schedule_for(&Trigger::Interval { seconds: 21_600 }).unwrap(),
            "0 */6 * * *"
        );
        for unsupported in [
            Trigger::Interval { seconds: 90 },
            Trigger::Interval { seconds: 420 },
            Trigger::Interval { seconds: 86_400 },
            Trigger::AtLogin,
            Trigger::OnDemand,
        ] {
            assert_eq!(schedule_for(&unsupported).unwrap_err().code(), "NOT_SUPPORTED");
        }
    }

    #[test]
    fn schedule_inverse() {
        assert_eq!(trigger_for("@reboot"), Some(Trigger::AtStartup));
        assert_eq!(trigger_for("*/5 * * * *"), Some(Trigger::Interval { seconds: 300 }));
        assert_eq!(trigger_for("0 */2 * * *"), Some(Trigger::Interval { seconds: 7_200 }));
        assert_eq!(
            trigger_for("30 9 * * 1-5"),
            Some(Trigger::Calendar(CalendarSchedule::daily(9, 30)))
        );
        assert_eq!(trigger_for("99 * * * *"), None);
        assert_eq!(trigger_for("@hourly"), None);
    }

    #[test]
    fn commands_quote_and_invert() {
        let actions = [
            Action::executable("/usr/local/bin/backup", vec!["--full".into()]),
            Action::shell_inline("date +%Y-%m-%d >> '/tmp/log file'"),
            Action::executable("/opt/x", vec!["it's".into(), String::new()]).in_directory("/srv/my app"),
        ];
        for action in actions {
            let command = command_for(&action).unwrap();
            assert!(!command.contains(" %") && !command.contains("+%"), "{command}");
            assert_eq!(action_for(&command), Some(action));
        }
        assert_eq!(
            command_for(&Action::executable("/bin/echo", vec!["a b".into()])).unwrap(),
            "/bin/echo 'a b'"
        );
    }

    #[tokio::test]
    async fn multi_line_script_is_refused() {
        let (runner, table) = crontab(USER_TABLE);
        let script = task().with_action(Action::shell_inline("echo a\necho b"));
        let err = adapter(runner.clone()).install(&script).await.unwrap_err();
        assert_eq!(err.code(), "NOT_SUPPORTED");
        assert!(runner.calls().is_empty());
        assert_eq!(*table.lock().unwrap(), USER_TABLE);

        let in_dir = task().with_action(
            Action::executable("/bin/true", vec![]).in_directory("/srv/a\nb"),
        );
        assert!(CronEntry::for_task(&in_dir).is_err());
    }

    #[test]
    fn hand_edited_quoting() {
        assert_eq!(
            shell_split(r#"/bin/echo "a \"b\"" c\ d"#).unwrap(),
            vec!["/bin/echo", "a \"b\"", "c d"]
        );
        assert!(shell_split("echo 'open").is_none());
    }

    #[test]
    fn table_preserves_foreign_lines() {
        let mut table = CronTable::parse(USER_TABLE);
        assert_eq!(table.entries().count(), 0);
        assert!(table.upsert(CronEntry::for_task(&task()).unwrap()));

        let text = table.render();
        assert!(text.starts_with(USER_TABLE));
        assert!(text.ends_with(
            "# runcast:t-1 Nightly backup\n30 2 * * * /usr/local/bin/backup --full\n"
        ));

        let reparsed = CronTable::parse(&text);
        assert_eq!(reparsed, table);
        assert!(!table.clone().upsert(CronEntry::for_task(&task()).unwrap()));
    }

    #[test]
    fn disabled_prefix_and_orphan_marker() {
        let text = "# runcast:a Job A\n#off# @reboot /bin/a\n# runcast:b dangling\n";
        let table = CronTable::parse(text);
        let entries: Vec<_> = table.entries().collect();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].enabled);
        assert_eq!(entries[0].schedule, "@reboot");
        assert_eq!(table.render(), text);
    }

    #[tokio::test]
    async fn install_disable_discover_uninstall() {
        let (runner, table) = crontab(USER_TABLE);
        let adapter = adapter(runner);
        let t = task();

        adapter.install(&t).await.unwrap();
        assert!(adapter.is_installed(&t).await.unwrap());

        adapter.disable(&t).await.unwrap();
        assert!(table.lock().unwrap().contains("#off# 30 2 * * *"));

        let found = adapter.discover_tasks().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, t.id);
        assert_eq!(found[0].name, "Nightly backup");
        assert_eq!(found[0].action, t.action);
        assert_eq!(found[0].trigger, t.trigger);
        assert_eq!(found[0].status, TaskStatus::Disabled);

        adapter.enable(&t).await.unwrap();
        adapter.uninstall(&t).await.unwrap();
        assert_eq!(*table.lock().unwrap(), USER_TABLE);
        adapter.uninstall(&t).await.unwrap();
    }

    #[tokio::test]
    async fn empty_crontab_is_not_an_error() {
        let (runner, _) = crontab("");
        let adapter = adapter(runner);
        assert!(adapter.discover_tasks().await.unwrap().is_empty());
        assert!(!adapter.is_installed(&task()).await.unwrap());
    }

    #[tokio::test]
    async fn enable_without_entry_fails() {
        let (runner, _) = crontab(USER_TABLE);
        let err = adapter(runner).enable(&task()).await.unwrap_err();
        assert_eq!(err.code(), "LOAD_FAILED");
    }

    #[tokio::test]
    async fn concurrent_change_is_retried_then_abandoned() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        // every listing differs from the previous one
        let runner = Arc::new(FakeRunner::with(move |inv| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            match inv.args[0].as_str() {
                "-l" => Ok(output(0, &format!("# edit {n}\n"), "")),
                _ => Ok(output(0, "", "")),
            }
        }));
        let err = adapter(runner.clone()).install(&task()).await.unwrap_err();
        assert_eq!(err.code(), "COMMAND_FAILED");
        assert_eq!(reads.load(Ordering::SeqCst), 2 * CAS_ATTEMPTS);
        assert!(runner.calls().iter().all(|argv| argv[1] == "-l"));
    }

    #[tokio::test]
    async fn rejected_table_is_artifact_failure() {
        let runner = Arc::new(FakeRunner::with(|inv| match inv.args[0].as_str() {
            "-l" => Ok(output(0, "", "")),
            _ => Ok(output(1, "", "\"-\":1: bad minute")),
        }));
        let err = adapter(runner).install(&task()).await.unwrap_err();
        assert_eq!(err.code(), "ARTIFACT_CREATION_FAILED");
    }
}
