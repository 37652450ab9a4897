//! Container runtime (docker-compatible CLI).
//!
//! A task owns one container, tagged with the [`TASK_LABEL`] label so
//! discovery can find it again. The configuration it was created from is
//! kept in the [`SPEC_LABEL`] label: inspect output mixes in image defaults
//! (`PATH`, default command), so it cannot be compared with a stored spec.
//!
//! Containers have no calendar scheduling: only on-demand and at-startup
//! (via restart policy) triggers are accepted.

use std::sync::Arc;

use async_trait::async_trait;
use runcast_container::{
    diff::{recreation_projection, restart_policy_changed},
    needs_recreation,
    translate::{parse_inspect, InspectRecord},
    ContainerInfo, RestartPolicy,
};
use runcast_core::config::{ContainerConfig, ExecutionConfig};
use runcast_schedule::{
    Action, BackendKind, ExecutionResult, ScheduledTask, TaskId, TaskStatus, Trigger,
};
use tracing::{debug, info, warn};

use crate::{
    adapter::{check_task, replace_artifact, BackendAdapter},
    error::{BackendError, Result},
    runner::{Invocation, ToolRunner},
};

pub const TASK_LABEL: &str = "runcast.task-id";
pub const SPEC_LABEL: &str = "runcast.spec";

pub struct ContainerAdapter {
    config: ContainerConfig,
    execution: ExecutionConfig,
    runner: Arc<dyn ToolRunner>,
}

impl ContainerAdapter {
    pub fn new(
        config: ContainerConfig,
        execution: ExecutionConfig,
        runner: Arc<dyn ToolRunner>,
    ) -> Self {
        Self {
            config,
            execution,
            runner,
        }
    }

    /// The container's name: the configured one, else derived from the id.
    pub fn container_ref(task: &ScheduledTask) -> String {
        task.container
            .as_ref()
            .and_then(|info| info.name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("runcast-{}", task.id))
    }

    /// The configuration the container should have, name filled in.
    fn desired(task: &ScheduledTask) -> Result<ContainerInfo> {
        let mut info = task.container.clone().ok_or_else(|| {
            BackendError::ArtifactCreation(format!("task {} has no container metadata", task.id))
        })?;
        info.name = Some(Self::container_ref(task));
        // At-startup is only expressible through the restart policy.
        if task.trigger == Trigger::AtStartup && info.restart_policy == RestartPolicy::No {
            info.restart_policy = RestartPolicy::Always;
        }
        Ok(info)
    }

    async fn runtime<I, S>(&self, args: I) -> Result<ExecutionResult>
    where
        I: IntoIterator<Item = S> + Send,
        S: Into<String>,
    {
        self.runner
            .run(&Invocation::new(self.config.binary.clone(), args))
            .await
    }

    async fn require_success(
        &self,
        args: Vec<String>,
        kind: fn(String) -> BackendError,
    ) -> Result<ExecutionResult> {
        let context = format!("{} {}", self.config.binary, args.join(" "));
        let result = self.runtime(args).await?;
        if !result.succeeded() {
            return Err(BackendError::from_exit(&result, &context, kind));
        }
        Ok(result)
    }

    /// Inspect records for the given containers; missing ones are left out.
    pub async fn inspect(&self, refs: &[String]) -> Result<Vec<InspectRecord>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["inspect".to_string(), "--type".into(), "container".into()];
        args.extend(refs.iter().cloned());
        let result = self.runtime(args).await?;

        // With several refs the runtime prints the ones it found and exits 1.
        if !result.succeeded() && !is_missing(&result) {
            return Err(BackendError::from_exit(
                &result,
                "container inspect",
                BackendError::CommandFailed,
            ));
        }
        if result.stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_inspect(&result.stdout)
            .map_err(|e| BackendError::CommandFailed(format!("unreadable inspect output: {e}")))
    }

    async fn inspect_task(&self, task: &ScheduledTask) -> Result<Option<InspectRecord>> {
        Ok(self
            .inspect(&[Self::container_ref(task)])
            .await?
            .into_iter()
            .next())
    }
}

fn is_missing(result: &ExecutionResult) -> bool {
    let stderr = result.stderr.to_lowercase();
    stderr.contains("no such container") || stderr.contains("no such object")
}

/// Labels attached at create time: the task id and the applied spec.
fn create_labels(task: &ScheduledTask, info: &ContainerInfo) -> Result<Vec<(String, String)>> {
    let spec = serde_json::to_string(&recreation_projection(info))
        .map_err(|e| BackendError::ArtifactCreation(format!("cannot encode container spec: {e}")))?;
    Ok(vec![
        (TASK_LABEL.to_string(), task.id.to_string()),
        (SPEC_LABEL.to_string(), spec),
    ])
}

/// The spec a container was created from, if it carries a readable
/// [`SPEC_LABEL`].
pub fn applied_spec(record: &InspectRecord) -> Option<ContainerInfo> {
    let raw = record.label(SPEC_LABEL)?;
    match serde_json::from_str(raw) {
        Ok(info) => Some(info),
        Err(e) => {
            warn!(container = %record.id, "unreadable {SPEC_LABEL} label: {e}");
            None
        }
    }
}

/// The container's configuration as runcast sees it: the applied spec with
/// the live restart policy and runtime fields, else the raw inspect view.
fn observed_info(record: &InspectRecord) -> ContainerInfo {
    let live = ContainerInfo::from_inspect(record);
    match applied_spec(record) {
        Some(spec) => ContainerInfo {
            restart_policy: live.restart_policy,
            compose_project: live.compose_project,
            compose_service: live.compose_service,
            container_id: live.container_id,
            status: live.status,
            created_at: live.created_at,
            ..spec
        },
        None => live,
    }
}

/// Rebuild a task from an inspect record carrying our label.
pub fn task_from_record(record: &InspectRecord) -> Option<ScheduledTask> {
    let id = record.label(TASK_LABEL).filter(|id| !id.is_empty())?;
    let info = observed_info(record);

    let name = info.name.clone().unwrap_or_else(|| id.to_string());
    let argv: Vec<String> = info
        .entrypoint
        .iter()
        .flatten()
        .chain(info.command.iter())
        .cloned()
        .collect();
    let action = Action::from_command_line(&argv, None)
        .unwrap_or_else(|| Action::executable(info.image.clone(), Vec::new()));
    let trigger = match info.restart_policy {
        RestartPolicy::Always | RestartPolicy::UnlessStopped => Trigger::AtStartup,
        RestartPolicy::No | RestartPolicy::OnFailure => Trigger::OnDemand,
    };
    let status = if record.is_running() {
        TaskStatus::Running
    } else {
        TaskStatus::Disabled
    };
    let compose_managed = info.is_compose_managed();

    let task = ScheduledTask::new(TaskId::from(id), name, BackendKind::Container, action, trigger)
        .with_container(info)
        .with_status(status);
    // Compose owns these; editing them here would fight the compose file.
    Some(if compose_managed { task.read_only() } else { task })
}

#[async_trait]
impl BackendAdapter for ContainerAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    async fn install(&self, task: &ScheduledTask) -> Result<()> {
        check_task(BackendKind::Container, task)?;
        if !matches!(task.trigger, Trigger::OnDemand | Trigger::AtStartup) {
            return Err(BackendError::NotSupported(format!(
                "containers cannot be scheduled {}",
                task.trigger.describe().to_lowercase()
            )));
        }
        let info = Self::desired(task)?;

        let mut args = vec!["create".to_string()];
        args.extend(info.run_args(&create_labels(task, &info)?));
        let context = format!("{} create {}", self.config.binary, info.image);
        // Creating may pull the image first.
        let invocation = Invocation::new(self.config.binary.clone(), args)
            .with_timeout(self.execution.effective_timeout_secs());
        let result = self.runner.run(&invocation).await?;
        if !result.succeeded() {
            return Err(BackendError::from_exit(
                &result,
                &context,
                BackendError::ArtifactCreation,
            ));
        }
        info!(
            task_id = %task.id,
            container = %Self::container_ref(task),
            image = %info.image,
            "container created"
        );
        Ok(())
    }

    async fn uninstall(&self, task: &ScheduledTask) -> Result<()> {
        let name = Self::container_ref(task);
        let result = self.runtime(["rm", "-f", name.as_str()]).await?;
        if !result.succeeded() {
            if is_missing(&result) {
                debug!(task_id = %task.id, "no container to remove");
                return Ok(());
            }
            return Err(BackendError::from_exit(
                &result,
                &format!("{} rm -f {name}", self.config.binary),
                BackendError::CommandFailed,
            ));
        }
        info!(task_id = %task.id, container = %name, "container removed");
        Ok(())
    }

    async fn enable(&self, task: &ScheduledTask) -> Result<()> {
        let name = Self::container_ref(task);
        self.require_success(vec!["start".into(), name.clone()], BackendError::LoadFailed)
            .await?;
        info!(task_id = %task.id, container = %name, "container started");
        Ok(())
    }

    async fn disable(&self, task: &ScheduledTask) -> Result<()> {
        let name = Self::container_ref(task);
        let result = self.runtime(["stop", name.as_str()]).await?;
        if !result.succeeded() {
            if is_missing(&result) {
                debug!(task_id = %task.id, "no container to stop");
                return Ok(());
            }
            return Err(BackendError::from_exit(
                &result,
                &format!("{} stop {name}", self.config.binary),
                BackendError::LoadFailed,
            ));
        }
        info!(task_id = %task.id, container = %name, "container stopped");
        Ok(())
    }

    async fn run_now(&self, task: &ScheduledTask) -> Result<ExecutionResult> {
        let name = Self::container_ref(task);
        let invocation =
            Invocation::new(self.config.binary.clone(), ["start", "-a", name.as_str()])
                .with_timeout(self.execution.effective_timeout_secs());
        let result = self.runner.run(&invocation).await?;
        info!(
            task_id = %task.id,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "container run finished"
        );
        Ok(result)
    }

    async fn is_installed(&self, task: &ScheduledTask) -> Result<bool> {
        Ok(self.inspect_task(task).await?.is_some())
    }

    async fn is_running(&self, task: &ScheduledTask) -> Result<bool> {
        Ok(self
            .inspect_task(task)
            .await?
            .is_some_and(|record| record.is_running()))
    }

    async fn discover_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let filter = format!("label={TASK_LABEL}");
        let listed = self
            .require_success(
                vec!["ps".into(), "-a".into(), "--filter".into(), filter, "-q".into()],
                BackendError::CommandFailed,
            )
            .await?;
        let ids: Vec<String> = listed
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        let tasks: Vec<ScheduledTask> = self
            .inspect(&ids)
            .await?
            .iter()
            .filter_map(|record| {
                let task = task_from_record(record);
                if task.is_none() {
                    warn!(container = %record.id, "labelled container without a task id");
                }
                task
            })
            .collect();
        info!(count = tasks.len(), "container discovery");
        Ok(tasks)
    }

    /// Apply a restart-policy-only change in place; anything else recreates.
    async fn update(&self, task: &ScheduledTask) -> Result<()> {
        check_task(BackendKind::Container, task)?;
        let desired = Self::desired(task)?;
        let Some(record) = self.inspect_task(task).await? else {
            return replace_artifact(self, task).await;
        };

        let live = observed_info(&record);
        if needs_recreation(&live, &desired) {
            info!(task_id = %task.id, "configuration changed; recreating container");
            return replace_artifact(self, task).await;
        }

        let name = Self::container_ref(task);
        if restart_policy_changed(&live, &desired) {
            self.require_success(
                vec![
                    "update".into(),
                    format!("--restart={}", desired.restart_policy),
                    name.clone(),
                ],
                BackendError::CommandFailed,
            )
            .await?;
            info!(task_id = %task.id, policy = %desired.restart_policy, "restart policy updated in place");
        }

        match (task.status.is_enabled(), record.is_running()) {
            (true, false) => self.enable(task).await,
            (false, true) => self.disable(task).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::fake::{output, FakeRunner};

    fn info() -> ContainerInfo {
        ContainerInfo {
            name: Some("web".into()),
            restart_policy: RestartPolicy::Always,
            ports: vec!["8080:80/tcp".into()],
            volumes: vec!["/srv/www:/usr/share/nginx/html:ro".into()],
            environment: BTreeMap::from([("A".to_string(), "1".to_string())]),
            command: vec!["nginx".into(), "-g".into(), "daemon off;".into()],
            ..ContainerInfo::new("nginx:1.27")
        }
    }

    fn task(info: ContainerInfo) -> ScheduledTask {
        ScheduledTask::new(
            TaskId::from("t-web"),
            "web",
            BackendKind::Container,
            Action::executable("nginx", vec![]),
            Trigger::AtStartup,
        )
        .with_container(info)
    }

    fn inspect_json(running: bool) -> String {
        json!([{
            "Id": "abc123",
            "Name": "/web",
            "Created": "2024-05-01T10:00:00Z",
            "State": {"Status": if running { "running" } else { "exited" }, "Running": running},
            "Config": {
                "Image": "nginx:1.27",
                "Env": ["A=1"],
                "Cmd": ["nginx", "-g", "daemon off;"],
                "Entrypoint": null,
                "Labels": {"runcast.task-id": "t-web"}
            },
            "HostConfig": {
                "RestartPolicy": {"Name": "always"},
                "NetworkMode": "default",
                "Binds": ["/srv/www:/usr/share/nginx/html:ro"]
            },
            "NetworkSettings": {
                "Ports": {"80/tcp": [
                    {"HostIp": "0.0.0.0", "HostPort": "8080"},
                    {"HostIp": "::", "HostPort": "8080"}
                ]}
            }
        }])
        .to_string()
    }

    /// Inspect output for a container created by `install`: the spec label is
    /// set, and the runtime has merged in the image's defaults.
    fn inspect_with_image_defaults(spec: &ContainerInfo) -> String {
        let label = serde_json::to_string(&recreation_projection(spec)).unwrap();
        json!([{
            "Id": "abc123",
            "Name": "/web",
            "State": {"Status": "running", "Running": true},
            "Config": {
                "Image": "nginx:1.27",
                "Env": [
                    "A=1",
                    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
                    "NGINX_VERSION=1.27.0"
                ],
                "Cmd": ["nginx", "-g", "daemon off;"],
                "Entrypoint": ["/docker-entrypoint.sh"],
                "Labels": {"runcast.task-id": "t-web", "runcast.spec": label}
            },
            "HostConfig": {
                "RestartPolicy": {"Name": "always"},
                "Binds": ["/srv/www:/usr/share/nginx/html:ro"]
            },
            "NetworkSettings": {
                "Ports": {"80/tcp": [{"HostIp": "0.0.0.0", "HostPort": "8080"}]}
            }
        }])
        .to_string()
    }

    /// A runtime with one live container named `web`.
    fn runtime(running: bool) -> Arc<FakeRunner> {
        Arc::new(FakeRunner::with(move |inv| match inv.args[0].as_str() {
            "inspect" => Ok(output(0, &inspect_json(running), "")),
            "ps" => Ok(output(0, "abc123\n", "")),
            _ => Ok(output(0, "", "")),
        }))
    }

    fn adapter(runner: Arc<FakeRunner>) -> ContainerAdapter {
        ContainerAdapter::new(ContainerConfig::default(), ExecutionConfig::default(), runner)
    }

    fn subcommands(runner: &FakeRunner) -> Vec<String> {
        runner.calls().iter().map(|argv| argv[1].clone()).collect()
    }

    #[tokio::test]
    async fn install_creates_labelled_container() {
        let runner = Arc::new(FakeRunner::ok());
        adapter(runner.clone()).install(&task(info())).await.unwrap();

        let argv = &runner.calls()[0];
        assert_eq!(&argv[..4], ["docker", "create", "--name", "web"]);
        assert!(argv.windows(2).any(|w| w == ["--label", "runcast.task-id=t-web"]));
        let spec = argv
            .iter()
            .find_map(|a| a.strip_prefix("runcast.spec="))
            .unwrap();
        let recorded: ContainerInfo = serde_json::from_str(spec).unwrap();
        assert!(!needs_recreation(&recorded, &info()));
        assert!(argv.windows(2).any(|w| w == ["-p", "8080:80/tcp"]));
        assert_eq!(argv.last().map(String::as_str), Some("daemon off;"));
    }

    #[tokio::test]
    async fn unnamed_container_gets_derived_name() {
        let runner = Arc::new(FakeRunner::ok());
        let mut unnamed = info();
        unnamed.name = None;
        adapter(runner.clone()).install(&task(unnamed)).await.unwrap();
        assert_eq!(runner.calls()[0][3], "runcast-t-web");
    }

    #[tokio::test]
    async fn calendar_trigger_not_supported() {
        let t = task(info()).with_trigger(Trigger::Interval { seconds: 60 });
        let err = adapter(Arc::new(FakeRunner::ok())).install(&t).await.unwrap_err();
        assert_eq!(err.code(), "NOT_SUPPORTED");
    }

    #[tokio::test]
    async fn create_failure_is_artifact_error() {
        let runner = Arc::new(FakeRunner::with(|_| {
            Ok(output(125, "", "Unable to find image 'nginx:1.27' locally"))
        }));
        let err = adapter(runner).install(&task(info())).await.unwrap_err();
        assert_eq!(err.code(), "ARTIFACT_CREATION_FAILED");
    }

    #[tokio::test]
    async fn removing_missing_container_succeeds() {
        let runner = Arc::new(FakeRunner::with(|_| {
            Ok(output(1, "", "Error response from daemon: No such container: web"))
        }));
        adapter(runner).uninstall(&task(info())).await.unwrap();
    }

    #[tokio::test]
    async fn stopping_missing_container_succeeds() {
        let runner = Arc::new(FakeRunner::with(|_| {
            Ok(output(1, "", "Error response from daemon: No such container: web"))
        }));
        adapter(runner.clone()).disable(&task(info())).await.unwrap();
        assert_eq!(subcommands(&runner), ["stop"]);
    }

    #[tokio::test]
    async fn stop_failure_is_load_error() {
        let runner = Arc::new(FakeRunner::with(|_| {
            Ok(output(1, "", "Error response from daemon: cannot stop container: web"))
        }));
        let err = adapter(runner).disable(&task(info())).await.unwrap_err();
        assert_eq!(err.code(), "LOAD_FAILED");
    }

    #[tokio::test]
    async fn daemon_permission_error_is_classified() {
        let runner = Arc::new(FakeRunner::with(|_| {
            Ok(output(1, "", "permission denied while trying to connect to the Docker daemon socket"))
        }));
        let err = adapter(runner).enable(&task(info())).await.unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn restart_policy_only_updates_in_place() {
        let runner = runtime(true);
        let mut changed = info();
        changed.restart_policy = RestartPolicy::UnlessStopped;

        adapter(runner.clone()).update(&task(changed)).await.unwrap();
        assert_eq!(subcommands(&runner), ["inspect", "update"]);
        assert_eq!(runner.calls()[1][2], "--restart=unless-stopped");
    }

    #[tokio::test]
    async fn image_defaults_do_not_force_recreation() {
        let fixture = inspect_with_image_defaults(&info());
        let runner = Arc::new(FakeRunner::with(move |inv| match inv.args[0].as_str() {
            "inspect" => Ok(output(0, &fixture, "")),
            _ => Ok(output(0, "", "")),
        }));
        let mut changed = info();
        changed.restart_policy = RestartPolicy::OnFailure;

        adapter(runner.clone()).update(&task(changed)).await.unwrap();
        assert_eq!(subcommands(&runner), ["inspect", "update"]);
        assert_eq!(runner.calls()[1][2], "--restart=on-failure");
    }

    #[tokio::test]
    async fn spec_change_recreates_despite_label() {
        let fixture = inspect_with_image_defaults(&info());
        let runner = Arc::new(FakeRunner::with(move |inv| match inv.args[0].as_str() {
            "inspect" => Ok(output(0, &fixture, "")),
            _ => Ok(output(0, "", "")),
        }));
        let mut changed = info();
        changed.environment.insert("B".into(), "2".into());

        adapter(runner.clone()).update(&task(changed)).await.unwrap();
        assert_eq!(subcommands(&runner), ["inspect", "rm", "create", "start"]);
    }

    #[test]
    fn discovery_prefers_applied_spec() {
        let record = parse_inspect(&inspect_with_image_defaults(&info()))
            .unwrap()
            .remove(0);
        let found = task_from_record(&record).unwrap();
        let found_info = found.container.unwrap();
        assert!(!found_info.environment.contains_key("PATH"));
        assert_eq!(found_info.entrypoint, None);
        assert_eq!(found_info.container_id.as_deref(), Some("abc123"));
        assert!(!needs_recreation(&found_info, &info()));
    }

    #[tokio::test]
    async fn unchanged_stopped_container_is_only_started() {
        let runner = runtime(false);
        adapter(runner.clone()).update(&task(info())).await.unwrap();
        assert_eq!(subcommands(&runner), ["inspect", "start"]);
    }

    #[tokio::test]
    async fn other_changes_recreate() {
        let runner = runtime(true);
        let mut changed = info();
        changed.image = "nginx:1.28".into();

        adapter(runner.clone()).update(&task(changed)).await.unwrap();
        assert_eq!(subcommands(&runner), ["inspect", "rm", "create", "start"]);
    }

    #[tokio::test]
    async fn update_without_container_installs() {
        let runner = Arc::new(FakeRunner::with(|inv| match inv.args[0].as_str() {
            "inspect" => Ok(output(1, "[]", "Error: No such object: web")),
            "rm" => Ok(output(1, "", "Error: No such container: web")),
            _ => Ok(output(0, "", "")),
        }));
        let t = task(info()).with_status(TaskStatus::Disabled);
        adapter(runner.clone()).update(&t).await.unwrap();
        assert_eq!(subcommands(&runner), ["inspect", "rm", "create"]);
    }

    #[tokio::test]
    async fn discovery_rebuilds_tasks() {
        let runner = runtime(true);
        let tasks = adapter(runner.clone()).discover_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);

        let found = &tasks[0];
        assert_eq!(found.id, TaskId::from("t-web"));
        assert_eq!(found.name, "web");
        assert_eq!(found.trigger, Trigger::AtStartup);
        assert_eq!(found.status, TaskStatus::Running);
        assert!(!found.read_only);

        let found_info = found.container.as_ref().unwrap();
        assert_eq!(found_info.ports, vec!["8080:80/tcp"]);
        assert!(!needs_recreation(found_info, &info()));

        assert_eq!(
            runner.calls()[0],
            ["docker", "ps", "-a", "--filter", "label=runcast.task-id", "-q"]
        );
    }

    #[tokio::test]
    async fn at_startup_defaults_restart_policy() {
        let runner = Arc::new(FakeRunner::ok());
        let mut plain = info();
        plain.restart_policy = RestartPolicy::No;
        adapter(runner.clone()).install(&task(plain)).await.unwrap();

        let argv = &runner.calls()[0];
        let at = argv.iter().position(|a| a == "--restart").unwrap();
        assert_eq!(argv[at + 1], "always");
    }

    #[test]
    fn compose_containers_are_read_only() {
        let mut record: Vec<InspectRecord> = parse_inspect(&inspect_json(true)).unwrap();
        let record = record.remove(0);
        let mut labels = record.config.labels.clone().unwrap();
        labels.insert("com.docker.compose.project".into(), "blog".into());
        let record = InspectRecord {
            config: runcast_container::translate::InspectConfig {
                labels: Some(labels),
                ..record.config.clone()
            },
            ..record
        };
        let task = task_from_record(&record).unwrap();
        assert!(task.read_only);
    }
}
