//! Strict save-time validation of a whole [`ScheduledTask`].
//!
//! Unlike `.env` import, nothing is skipped here: the save is blocked and
//! every violation is returned so a form can show them all at once.

use crate::types::{BackendKind, ScheduledTask, Trigger};

impl ScheduledTask {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        }
        if self.name.contains('\0') {
            errors.push("name contains a null byte".to_string());
        }
        if self.description.contains('\0') {
            errors.push("description contains a null byte".to_string());
        }

        errors.extend(self.action.validate());

        match &self.trigger {
            Trigger::Calendar(schedule) => errors.extend(schedule.validate()),
            Trigger::Interval { seconds: 0 } => {
                errors.push("interval must be greater than zero seconds".to_string());
            }
            _ => {}
        }

        match self.backend {
            BackendKind::Container => {
                if self.vm.is_some() {
                    errors.push("container task must not carry VM metadata".to_string());
                }
                match &self.container {
                    Some(info) => errors.extend(info.validate()),
                    None => errors.push("container task needs container metadata".to_string()),
                }
            }
            BackendKind::Vm => {
                if self.container.is_some() {
                    errors.push("VM task must not carry container metadata".to_string());
                }
                match &self.vm {
                    Some(vm) if vm.vm_name.trim().is_empty() => {
                        errors.push("VM name must not be empty".to_string());
                    }
                    Some(vm) if vm.vm_name.contains(char::is_whitespace) => {
                        errors.push(format!("VM name {:?} must not contain whitespace", vm.vm_name));
                    }
                    Some(_) => {}
                    None => errors.push("VM task needs VM metadata".to_string()),
                }
            }
            BackendKind::Launchd | BackendKind::Cron => {
                if self.container.is_some() || self.vm.is_some() {
                    errors.push(format!(
                        "{} task must not carry container or VM metadata",
                        self.backend
                    ));
                }
            }
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use runcast_container::ContainerInfo;

    use crate::types::{Action, CalendarSchedule, TaskId, VmInfo};

    use super::*;

    fn task(backend: BackendKind) -> ScheduledTask {
        ScheduledTask::new(
            TaskId::from_label("nightly"),
            "nightly",
            backend,
            Action::executable("/usr/local/bin/nightly", vec![]),
            Trigger::Calendar(CalendarSchedule::daily(2, 0)),
        )
    }

    #[test]
    fn plain_launchd_task_is_valid() {
        assert!(task(BackendKind::Launchd).is_valid());
    }

    #[test]
    fn every_violation_is_listed() {
        let mut t = task(BackendKind::Cron);
        t.name = String::new();
        t.description = "bad\0".to_string();
        t.action = Action::executable("", vec![]);
        t.trigger = Trigger::Calendar(CalendarSchedule {
            minute: Some(75),
            ..CalendarSchedule::daily(25, 0)
        });
        t.vm = Some(VmInfo::default());

        let errors = t.validate();
        // name, description, action, minute, hour, metadata
        assert_eq!(errors.len(), 6, "{errors:?}");
    }

    #[test]
    fn zero_interval_rejected() {
        let t = task(BackendKind::Launchd).with_trigger(Trigger::Interval { seconds: 0 });
        assert_eq!(t.validate().len(), 1);
    }

    #[test]
    fn container_metadata_rules() {
        let missing = task(BackendKind::Container);
        assert_eq!(missing.validate(), vec!["container task needs container metadata"]);

        let ok = task(BackendKind::Container).with_container(ContainerInfo::new("nginx"));
        assert!(ok.is_valid());

        let mut both = ok.clone();
        both.vm = Some(VmInfo {
            vm_name: "x".to_string(),
            ..Default::default()
        });
        assert_eq!(both.validate().len(), 1);
    }

    #[test]
    fn container_policy_errors_surface() {
        let mut info = ContainerInfo::new("nginx");
        info.environment.insert("LD_PRELOAD".to_string(), "x".to_string());
        let t = task(BackendKind::Container).with_container(info);
        assert_eq!(t.validate().len(), 1);
    }

    #[test]
    fn vm_name_rules() {
        let t = task(BackendKind::Vm).with_vm(VmInfo {
            vm_name: "has space".to_string(),
            ..Default::default()
        });
        assert_eq!(t.validate().len(), 1);

        let t = task(BackendKind::Vm).with_vm(VmInfo {
            vm_name: "builder".to_string(),
            ..Default::default()
        });
        assert!(t.is_valid());
    }
}
