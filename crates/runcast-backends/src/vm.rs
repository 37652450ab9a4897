//! Virtual machines through Lima (`limactl`).
//!
//! A VM task owns one instance named `<name_prefix><vm_name>`. The prefix
//! marks instances as ours during discovery. Enabling boots the instance;
//! `run_now` executes the task's action inside it.

use std::sync::Arc;

use async_trait::async_trait;
use runcast_core::config::{ExecutionConfig, VmConfig};
use runcast_schedule::{
    Action, BackendKind, ExecutionResult, ScheduledTask, TaskId, TaskStatus, Trigger, VmInfo,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    adapter::{check_task, BackendAdapter},
    error::{BackendError, Result},
    runner::{Invocation, ToolRunner},
};

const GIB: u64 = 1 << 30;

/// One line of `limactl list --json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimaInstance {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub cpus: Option<u32>,
    /// Bytes.
    #[serde(default)]
    pub memory: Option<u64>,
    /// Bytes.
    #[serde(default)]
    pub disk: Option<u64>,
}

impl LimaInstance {
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }
}

/// Parse the newline-delimited JSON objects printed by `list --json`.
/// Unreadable lines are skipped.
pub fn parse_instances(text: &str) -> Vec<LimaInstance> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(instance) => Some(instance),
            Err(e) => {
                warn!("unreadable limactl list line: {e}");
                None
            }
        })
        .collect()
}

pub struct VmAdapter {
    config: VmConfig,
    execution: ExecutionConfig,
    runner: Arc<dyn ToolRunner>,
}

impl VmAdapter {
    pub fn new(config: VmConfig, execution: ExecutionConfig, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            config,
            execution,
            runner,
        }
    }

    pub fn instance_name(&self, vm: &VmInfo) -> String {
        if vm.vm_name.starts_with(&self.config.name_prefix) {
            vm.vm_name.clone()
        } else {
            format!("{}{}", self.config.name_prefix, vm.vm_name)
        }
    }

    fn instance_for(&self, task: &ScheduledTask) -> Result<String> {
        task.vm
            .as_ref()
            .map(|vm| self.instance_name(vm))
            .ok_or_else(|| BackendError::NotSupported(format!("task {} has no VM metadata", task.id)))
    }

    async fn limactl(&self, args: Vec<String>, timeout_secs: u64) -> Result<ExecutionResult> {
        self.runner
            .run(&Invocation::new(self.config.binary.clone(), args).with_timeout(timeout_secs))
            .await
    }

    async fn limactl_checked(
        &self,
        args: Vec<String>,
        kind: fn(String) -> BackendError,
    ) -> Result<ExecutionResult> {
        let context = format!("{} {}", self.config.binary, args.join(" "));
        let result = self
            .limactl(args, self.execution.effective_timeout_secs())
            .await?;
        if !result.succeeded() {
            return Err(BackendError::from_exit(&result, &context, kind));
        }
        Ok(result)
    }

    pub async fn list(&self) -> Result<Vec<LimaInstance>> {
        let result = self
            .limactl_checked(
                vec!["list".into(), "--json".into()],
                BackendError::CommandFailed,
            )
            .await?;
        Ok(parse_instances(&result.stdout))
    }

    async fn find(&self, name: &str) -> Result<Option<LimaInstance>> {
        Ok(self.list().await?.into_iter().find(|i| i.name == name))
    }

    fn task_from_instance(&self, instance: &LimaInstance) -> Option<ScheduledTask> {
        let vm_name = instance.name.strip_prefix(&self.config.name_prefix)?;
        if vm_name.is_empty() {
            return None;
        }
        let info = VmInfo {
            vm_name: vm_name.to_string(),
            template: None,
            cpus: instance.cpus,
            memory_gib: instance.memory.and_then(|b| u32::try_from(b / GIB).ok()),
            disk_gib: instance.disk.and_then(|b| u32::try_from(b / GIB).ok()),
            status: Some(instance.status.clone()).filter(|s| !s.is_empty()),
        };
        let status = if instance.is_running() {
            TaskStatus::Running
        } else {
            TaskStatus::Disabled
        };
        // The instance records nothing about what to run in it; discovered
        // tasks get a harmless placeholder command.
        let task = ScheduledTask::new(
            TaskId::from_label(&instance.name),
            vm_name,
            BackendKind::Vm,
            Action::executable("uname", vec!["-a".to_string()]),
            Trigger::OnDemand,
        )
        .with_vm(info)
        .with_status(status);
        Some(task)
    }
}

fn is_missing(result: &ExecutionResult) -> bool {
    let stderr = result.stderr.to_lowercase();
    stderr.contains("not found") || stderr.contains("does not exist")
}

#[async_trait]
impl BackendAdapter for VmAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Vm
    }

    async fn install(&self, task: &ScheduledTask) -> Result<()> {
        check_task(BackendKind::Vm, task)?;
        if task.trigger != Trigger::OnDemand {
            return Err(BackendError::NotSupported(
                "VM tasks only run on demand".to_string(),
            ));
        }
        let vm = task
            .vm
            .as_ref()
            .ok_or_else(|| BackendError::NotSupported(format!("task {} has no VM metadata", task.id)))?;
        let name = self.instance_name(vm);

        let mut args = vec![
            "create".to_string(),
            format!("--name={name}"),
            "--tty=false".to_string(),
        ];
        if let Some(cpus) = vm.cpus {
            args.push(format!("--cpus={cpus}"));
        }
        if let Some(memory) = vm.memory_gib {
            args.push(format!("--memory={memory}"));
        }
        if let Some(disk) = vm.disk_gib {
            args.push(format!("--disk={disk}"));
        }
        args.push(
            vm.template
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| self.config.default_template.clone()),
        );

        self.limactl_checked(args, BackendError::ArtifactCreation)
            .await?;
        info!(task_id = %task.id, instance = %name, "VM instance created");
        Ok(())
    }

    async fn uninstall(&self, task: &ScheduledTask) -> Result<()> {
        let name = self.instance_for(task)?;
        let result = self
            .limactl(
                vec!["delete".into(), "--force".into(), name.clone()],
                self.execution.effective_timeout_secs(),
            )
            .await?;
        if !result.succeeded() {
            if is_missing(&result) {
                debug!(task_id = %task.id, instance = %name, "no instance to delete");
                return Ok(());
            }
            return Err(BackendError::from_exit(
                &result,
                &format!("{} delete {name}", self.config.binary),
                BackendError::CommandFailed,
            ));
        }
        info!(task_id = %task.id, instance = %name, "VM instance deleted");
        Ok(())
    }

    async fn enable(&self, task: &ScheduledTask) -> Result<()> {
        let name = self.instance_for(task)?;
        self.limactl_checked(
            vec!["start".into(), "--tty=false".into(), name.clone()],
            BackendError::LoadFailed,
        )
        .await?;
        info!(task_id = %task.id, instance = %name, "VM started");
        Ok(())
    }

    async fn disable(&self, task: &ScheduledTask) -> Result<()> {
        let name = self.instance_for(task)?;
        let result = self
            .limactl(
                vec!["stop".into(), name.clone()],
                self.execution.effective_timeout_secs(),
            )
            .await?;
        if !result.succeeded() {
            if is_missing(&result) {
                debug!(task_id = %task.id, instance = %name, "no VM instance to stop");
                return Ok(());
            }
            return Err(BackendError::from_exit(
                &result,
                &format!("{} stop {name}", self.config.binary),
                BackendError::LoadFailed,
            ));
        }
        info!(task_id = %task.id, instance = %name, "VM stopped");
        Ok(())
    }

    async fn run_now(&self, task: &ScheduledTask) -> Result<ExecutionResult> {
        let name = self.instance_for(task)?;
        let mut args = vec!["shell".to_string()];
        if let Some(dir) = &task.action.working_directory {
            args.push(format!("--workdir={dir}"));
        }
        args.push(name);
        args.extend(task.action.command_line());

        let result = self
            .limactl(args, self.execution.effective_timeout_secs())
            .await?;
        info!(
            task_id = %task.id,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "VM run finished"
        );
        Ok(result)
    }

    async fn is_installed(&self, task: &ScheduledTask) -> Result<bool> {
        let name = self.instance_for(task)?;
        Ok(self.find(&name).await?.is_some())
    }

    async fn is_running(&self, task: &ScheduledTask) -> Result<bool> {
        let name = self.instance_for(task)?;
        Ok(self.find(&name).await?.is_some_and(|i| i.is_running()))
    }

    async fn discover_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let tasks: Vec<ScheduledTask> = self
            .list()
            .await?
            .iter()
            .filter_map(|instance| self.task_from_instance(instance))
            .collect();
        info!(count = tasks.len(), "VM discovery");
        Ok(tasks)
    }
}
