use async_trait::async_trait;
use runcast_core::config::ExecutionConfig;
use runcast_schedule::{BackendKind, ExecutionResult, ScheduledTask};
use tracing::info;

use crate::{
    error::{BackendError, Result},
    runner::{Invocation, ToolRunner},
};

/// Uniform capability set implemented once per backend.
///
/// Calls for one task must not overlap: [`BackendAdapter::update`] is a
/// sequence of primitives with no rollback.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// The backend this adapter projects tasks onto.
    fn kind(&self) -> BackendKind;

    /// Create the backend-native artifact for `task`.
    async fn install(&self, task: &ScheduledTask) -> Result<()>;

    /// Remove the artifact. Removing something that is not there succeeds.
    async fn uninstall(&self, task: &ScheduledTask) -> Result<()>;

    async fn enable(&self, task: &ScheduledTask) -> Result<()>;

    async fn disable(&self, task: &ScheduledTask) -> Result<()>;

    /// Run the task once, out of band, within the configured time budget.
    async fn run_now(&self, task: &ScheduledTask) -> Result<ExecutionResult>;

    async fn is_installed(&self, task: &ScheduledTask) -> Result<bool>;

    async fn is_running(&self, task: &ScheduledTask) -> Result<bool>;

    /// Reconstruct every task this system owns from the backend's native state.
    async fn discover_tasks(&self) -> Result<Vec<ScheduledTask>>;

    /// Re-project an edited task: uninstall, install, then enable if the
    /// task is enabled.
    async fn update(&self, task: &ScheduledTask) -> Result<()> {
        replace_artifact(self, task).await
    }
}

/// The default update sequence, callable from adapters that override
/// [`BackendAdapter::update`] but fall back to it.
pub async fn replace_artifact<A>(adapter: &A, task: &ScheduledTask) -> Result<()>
where
    A: BackendAdapter + ?Sized,
{
    info!(task_id = %task.id, backend = %adapter.kind(), "replacing backend artifact");
    adapter.uninstall(task).await?;
    adapter.install(task).await?;
    if task.status.is_enabled() {
        adapter.enable(task).await?;
    }
    Ok(())
}

/// Reject tasks that belong to another backend or fail save-time validation.
pub(crate) fn check_task(kind: BackendKind, task: &ScheduledTask) -> Result<()> {
    if task.backend != kind {
        return Err(BackendError::NotSupported(format!(
            "task {} targets the {} backend, not {kind}",
            task.id, task.backend
        )));
    }
    let errors = task.validate();
    if !errors.is_empty() {
        return Err(BackendError::ArtifactCreation(errors.join("; ")));
    }
    Ok(())
}

/// Execute the task's action directly, for backends whose scheduler offers
/// no "start now" primitive of its own.
pub(crate) async fn run_action_directly(
    runner: &dyn ToolRunner,
    execution: &ExecutionConfig,
    task: &ScheduledTask,
) -> Result<ExecutionResult> {
    let argv = task.action.command_line();
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| BackendError::CommandFailed("action has an empty command line".to_string()))?;

    let invocation = Invocation::new(program.clone(), args.to_vec())
        .in_directory(task.action.working_directory.clone())
        .with_timeout(execution.effective_timeout_secs());
    let result = runner.run(&invocation).await?;
    info!(
        task_id = %task.id,
        exit_code = result.exit_code,
        duration_ms = result.duration_ms,
        "run-now finished"
    );
    Ok(result)
}
