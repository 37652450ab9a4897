use std::{path::Path, process::ExitCode, sync::Arc};

use anyhow::Context as _;
use runcast_backends::{adapter_for, BackendAdapter, ProcessRunner, ToolRunner};
use runcast_core::RuncastConfig;
use runcast_schedule::{BackendKind, ScheduledTask, TaskId, TaskStatus, TaskStore};
use tracing::{info, warn};

use crate::cli::TaskCommand;

/// Everything a task command needs: config, the store and a way to reach
/// the OS.
pub struct Context {
    config: RuncastConfig,
    runner: Arc<dyn ToolRunner>,
}

impl Context {
    pub fn new(config: RuncastConfig) -> Self {
        let runner = Arc::new(ProcessRunner::new(&config.execution));
        Self { config, runner }
    }

    fn store(&self) -> anyhow::Result<TaskStore> {
        let path = &self.config.database.path;
        self.config
            .database
            .ensure_parent_dir()
            .with_context(|| format!("creating directory for {path}"))?;
        TaskStore::open(path).with_context(|| format!("opening task store {path}"))
    }

    fn adapter(&self, kind: BackendKind) -> Box<dyn BackendAdapter> {
        adapter_for(kind, &self.config, self.runner.clone())
    }
}

pub async fn run(ctx: &Context, command: TaskCommand) -> anyhow::Result<ExitCode> {
    match command {
        TaskCommand::List { backend } => {
            let tasks: Vec<ScheduledTask> = ctx
                .store()?
                .list_tasks()?
                .into_iter()
                .filter(|t| backend.map_or(true, |b| t.backend == b))
                .collect();
            print_tasks(&tasks);
        }

        TaskCommand::Show { id } => {
            let task = ctx.store()?.load_task(&TaskId::from(id))?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }

        TaskCommand::Save { file } => {
            let task = read_task(&file)?;
            ctx.store()?.save_task(&task)?;
            println!("saved {}", task.id);
        }

        TaskCommand::Install { file } => {
            let task = read_task(&file)?;
            let store = ctx.store()?;
            store.save_task(&task)?;
            let adapter = ctx.adapter(task.backend);
            adapter.install(&task).await?;
            if task.status.is_enabled() {
                adapter.enable(&task).await?;
            }
            info!(task_id = %task.id, backend = %task.backend, "task installed");
            println!("installed {} on {}", task.id, task.backend);
        }

        TaskCommand::Update { file } => {
            let task = read_task(&file)?;
            let store = ctx.store()?;
            let previous = store.load_task(&task.id).ok();
            if let Some(previous) = previous.filter(|p| p.backend != task.backend) {
                // Moving backends: the old artifact would otherwise linger.
                ctx.adapter(previous.backend).uninstall(&previous).await?;
            }
            store.save_task(&task)?;
            ctx.adapter(task.backend).update(&task).await?;
            println!("updated {}", task.id);
        }

        TaskCommand::Uninstall { id, forget } => {
            let store = ctx.store()?;
            let task = store.load_task(&TaskId::from(id))?;
            ctx.adapter(task.backend).uninstall(&task).await?;
            if forget {
                store.remove_task(&task.id)?;
            }
            println!("uninstalled {}", task.id);
        }

        TaskCommand::Enable { id } => {
            set_enabled(ctx, &TaskId::from(id), true).await?;
        }

        TaskCommand::Disable { id } => {
            set_enabled(ctx, &TaskId::from(id), false).await?;
        }

        TaskCommand::Run { id } => {
            let store = ctx.store()?;
            let task = store.load_task(&TaskId::from(id))?;
            let result = ctx.adapter(task.backend).run_now(&task).await?;
            if let Err(e) = store.record_execution(&task.id, &result) {
                warn!(task_id = %task.id, "run not recorded: {e}");
            }

            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
            eprintln!("exit {} after {} ms", result.exit_code, result.duration_ms);
            if !result.succeeded() {
                let code = u8::try_from(result.exit_code).unwrap_or(1);
                return Ok(ExitCode::from(code.max(1)));
            }
        }

        TaskCommand::History { id, limit } => {
            let runs = ctx.store()?.history(&TaskId::from(id), limit)?;
            if runs.is_empty() {
                println!("no runs recorded");
            }
            for run in runs {
                println!(
                    "{}  exit {:>3}  {:>7} ms",
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.exit_code,
                    run.duration_ms
                );
            }
        }

        TaskCommand::Discover { backend, import } => {
            let kinds: Vec<BackendKind> = match backend {
                Some(kind) => vec![kind],
                None => BackendKind::ALL.to_vec(),
            };
            let mut found = Vec::new();
            for kind in kinds {
                match ctx.adapter(kind).discover_tasks().await {
                    Ok(tasks) => found.extend(tasks),
                    // A missing tool only hides that backend.
                    Err(e) if backend.is_none() => warn!(backend = %kind, "discovery skipped: {e}"),
                    Err(e) => return Err(e.into()),
                }
            }
            print_tasks(&found);

            if import {
                let store = ctx.store()?;
                let mut saved = 0;
                for task in &found {
                    match store.save_task(task) {
                        Ok(()) => saved += 1,
                        Err(e) => warn!(task_id = %task.id, "not imported: {e}"),
                    }
                }
                println!("imported {saved} of {}", found.len());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn set_enabled(ctx: &Context, id: &TaskId, enabled: bool) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let task = store.load_task(id)?;
    if task.read_only {
        anyhow::bail!("task {id} is managed elsewhere and is read-only");
    }
    let adapter = ctx.adapter(task.backend);
    let status = if enabled {
        adapter.enable(&task).await?;
        TaskStatus::Enabled
    } else {
        adapter.disable(&task).await?;
        TaskStatus::Disabled
    };
    store.save_task(&task.with_status(status))?;
    println!("{id} {status}");
    Ok(())
}

fn read_task(path: &Path) -> anyhow::Result<ScheduledTask> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_tasks(tasks: &[ScheduledTask]) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    for task in tasks {
        let flag = if task.read_only { " (read-only)" } else { "" };
        println!(
            "{:<36}  {:<9}  {:<8}  {:<24}  {}{flag}",
            task.id.as_str(),
            task.backend.as_str(),
            task.status.to_string(),
            task.trigger.describe(),
            task.name
        );
    }
}

#[cfg(test)]
mod tests {
    use runcast_schedule::{Action, CalendarSchedule, Trigger};

    use super::*;

    fn context(dir: &Path) -> Context {
        let mut config = RuncastConfig::default();
        config.database.path = dir.join("db/runcast.db").to_string_lossy().into_owned();
        Context::new(config)
    }

    fn write_task(dir: &Path) -> std::path::PathBuf {
        let task = ScheduledTask::new(
            TaskId::from("cli-1"),
            "report",
            BackendKind::Cron,
            Action::shell_inline("echo report"),
            Trigger::Calendar(CalendarSchedule::daily(7, 0)),
        );
        let path = dir.join("task.json");
        std::fs::write(&path, serde_json::to_string(&task).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn save_then_show_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let file = write_task(dir.path());

        run(&ctx, TaskCommand::Save { file }).await.unwrap();
        run(&ctx, TaskCommand::Show { id: "cli-1".into() }).await.unwrap();
        run(&ctx, TaskCommand::List { backend: None }).await.unwrap();

        let stored = ctx.store().unwrap().load_task(&TaskId::from("cli-1")).unwrap();
        assert_eq!(stored.name, "report");
        // parent directory of the database was created
        assert!(dir.path().join("db").is_dir());
    }

    #[tokio::test]
    async fn invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let file = dir.path().join("bad.json");
        std::fs::write(&file, "{\"name\": 3}").unwrap();
        assert!(run(&ctx, TaskCommand::Save { file }).await.is_err());
    }

    #[tokio::test]
    async fn unknown_task_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let err = run(&ctx, TaskCommand::Run { id: "nope".into() }).await.unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
