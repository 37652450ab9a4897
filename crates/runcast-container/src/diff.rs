//! Recreation diff.
//!
//! A running container can only have its restart policy changed in place.
//! Every other configuration change requires destroy-and-recreate, so the
//! decision is made by projecting both sides onto the fields that matter and
//! comparing the projections with full structural equality. New fields on
//! [`ContainerInfo`] are therefore covered automatically.

use crate::types::{ContainerInfo, RestartPolicy};

/// Copy of `info` with every field that can change without recreation
/// cleared: the restart policy, plus the read-only fields filled in by
/// discovery (id, status, creation time), which describe observed state
/// rather than configuration.
pub fn recreation_projection(info: &ContainerInfo) -> ContainerInfo {
    ContainerInfo {
        restart_policy: RestartPolicy::default(),
        container_id: None,
        status: None,
        created_at: None,
        ..info.clone()
    }
}

/// `true` when moving from `old` to `new` requires destroying the container.
pub fn needs_recreation(old: &ContainerInfo, new: &ContainerInfo) -> bool {
    recreation_projection(old) != recreation_projection(new)
}

/// `true` when the in-place update path has something to apply.
pub fn restart_policy_changed(old: &ContainerInfo, new: &ContainerInfo) -> bool {
    old.restart_policy != new.restart_policy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ContainerInfo {
        let mut info = ContainerInfo::new("nginx:1.27");
        info.name = Some("web".to_string());
        info.ports = vec!["8080:80/tcp".to_string()];
        info.volumes = vec!["/srv/www:/usr/share/nginx/html:ro".to_string()];
        info.environment.insert("TZ".to_string(), "UTC".to_string());
        info.command = vec!["nginx".to_string(), "-g".to_string()];
        info
    }

    #[test]
    fn identical_needs_nothing() {
        assert!(!needs_recreation(&base(), &base()));
    }

    #[test]
    fn restart_policy_only_is_in_place() {
        let old = base();
        let mut new = base();
        new.restart_policy = RestartPolicy::UnlessStopped;
        assert!(!needs_recreation(&old, &new));
        assert!(restart_policy_changed(&old, &new));
    }

    #[test]
    fn discovery_fields_are_ignored() {
        let mut old = base();
        old.container_id = Some("abc123".to_string());
        old.status = Some("Up 5 minutes".to_string());
        old.created_at = Some("2026-01-01T00:00:00Z".to_string());
        assert!(!needs_recreation(&old, &base()));
    }

    #[test]
    fn every_configuration_field_forces_recreation() {
        let mutations: Vec<fn(&mut ContainerInfo)> = vec![
            |c| c.image = "nginx:1.28".to_string(),
            |c| c.name = Some("web2".to_string()),
            |c| c.ports[0] = "8081:80/tcp".to_string(),
            |c| c.ports.push("8443:443/tcp".to_string()),
            |c| c.volumes.clear(),
            |c| {
                c.environment.insert("TZ".to_string(), "Europe/Berlin".to_string());
            },
            |c| {
                c.environment.insert("EXTRA".to_string(), "1".to_string());
            },
            |c| c.command.push("daemon off;".to_string()),
            |c| c.entrypoint = Some(vec!["/docker-entrypoint.sh".to_string()]),
            |c| c.network_mode = Some("host".to_string()),
            |c| c.compose_project = Some("stack".to_string()),
        ];

        for (i, mutate) in mutations.into_iter().enumerate() {
            let old = base();
            let mut new = base();
            mutate(&mut new);
            assert!(needs_recreation(&old, &new), "mutation #{i} was not detected");
        }
    }

    #[test]
    fn restart_policy_plus_other_change_still_recreates() {
        let old = base();
        let mut new = base();
        new.restart_policy = RestartPolicy::Always;
        new.image = "nginx:mainline".to_string();
        assert!(needs_recreation(&old, &new));
    }
}
