use std::sync::Arc;

use runcast_core::RuncastConfig;
use runcast_schedule::BackendKind;

use crate::{
    adapter::BackendAdapter, container::ContainerAdapter, crontab::CronTableAdapter,
    launchd::LaunchdAdapter, runner::ToolRunner, vm::VmAdapter,
};

/// Build the adapter for `kind`. Each call returns a fresh, independent
/// adapter; callers hold on to it for as long as they need it.
pub fn adapter_for(
    kind: BackendKind,
    config: &RuncastConfig,
    runner: Arc<dyn ToolRunner>,
) -> Box<dyn BackendAdapter> {
    let execution = config.execution.clone();
    match kind {
        BackendKind::Launchd => Box::new(LaunchdAdapter::new(
            config.launchd.clone(),
            execution,
            runner,
        )),
        BackendKind::Cron => Box::new(CronTableAdapter::new(config.cron.clone(), execution, runner)),
        BackendKind::Container => Box::new(ContainerAdapter::new(
            config.container.clone(),
            execution,
            runner,
        )),
        BackendKind::Vm => Box::new(VmAdapter::new(config.vm.clone(), execution, runner)),
    }
}
