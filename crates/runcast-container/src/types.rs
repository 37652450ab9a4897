use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{env, ports::PortMapping, volumes::VolumeMount};

/// Restart policy applied by the container runtime.
///
/// This is the only field that can change on a live container without
/// recreating it (see [`crate::diff`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    #[serde(alias = "none")]
    No,
    Always,
    UnlessStopped,
    OnFailure,
}

impl RestartPolicy {
    /// The string the runtime CLI expects for `--restart`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::UnlessStopped => "unless-stopped",
            RestartPolicy::OnFailure => "on-failure",
        }
    }
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "no" | "none" => Ok(RestartPolicy::No),
            "always" => Ok(RestartPolicy::Always),
            "unless-stopped" => Ok(RestartPolicy::UnlessStopped),
            "on-failure" => Ok(RestartPolicy::OnFailure),
            other => Err(format!("unknown restart policy: {other}")),
        }
    }
}

/// Container configuration attached to a container-backed task.
///
/// Ports and volumes are kept in their canonical string forms
/// (`host:container/proto`, `host:container[:mode]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Image reference, e.g. `nginx:1.27`.
    pub image: String,
    /// Assigned container name; the runtime picks one when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose_project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose_service: Option<String>,

    // --- read-only, filled in by discovery -------------------------------
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ContainerInfo {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Parsed view of [`Self::ports`]; unparseable entries are skipped.
    pub fn port_mappings(&self) -> Vec<PortMapping> {
        self.ports.iter().filter_map(|p| PortMapping::parse(p)).collect()
    }

    /// Parsed view of [`Self::volumes`]; unparseable entries are skipped.
    pub fn volume_mounts(&self) -> Vec<VolumeMount> {
        self.volumes.iter().filter_map(|v| VolumeMount::parse(v)).collect()
    }

    /// True when the container belongs to a compose application.
    pub fn is_compose_managed(&self) -> bool {
        self.compose_project.is_some()
    }

    /// Strict save-time validation. Returns one message per violation.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.image.trim().is_empty() {
            errors.push("container image must not be empty".to_string());
        }
        if self.image.contains('\0') {
            errors.push("container image contains a null byte".to_string());
        }
        if let Some(name) = &self.name {
            if name.contains('\0') {
                errors.push("container name contains a null byte".to_string());
            }
        }
        for port in &self.ports {
            if PortMapping::parse(port).is_none() {
                errors.push(format!("invalid port mapping: {port:?}"));
            }
        }
        for volume in &self.volumes {
            if VolumeMount::parse(volume).is_none() {
                errors.push(format!("invalid volume: {volume:?}"));
            }
        }
        errors.extend(env::validate_env(&self.environment));
        if self.command.iter().any(|t| t.contains('\0')) {
            errors.push("command contains a null byte".to_string());
        }
        if let Some(entrypoint) = &self.entrypoint {
            if entrypoint.iter().any(|t| t.contains('\0')) {
                errors.push("entrypoint contains a null byte".to_string());
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_policy_strings() {
        assert_eq!(RestartPolicy::UnlessStopped.as_str(), "unless-stopped");
        assert_eq!("none".parse::<RestartPolicy>().unwrap(), RestartPolicy::No);
        assert_eq!("on-failure".parse::<RestartPolicy>().unwrap(), RestartPolicy::OnFailure);
        assert!("sometimes".parse::<RestartPolicy>().is_err());
    }

    #[test]
    fn restart_policy_serde_uses_runtime_strings() {
        let json = serde_json::to_string(&RestartPolicy::UnlessStopped).unwrap();
        assert_eq!(json, r#""unless-stopped""#);
        let back: RestartPolicy = serde_json::from_str(r#""none""#).unwrap();
        assert_eq!(back, RestartPolicy::No);
    }

    #[test]
    fn valid_info_has_no_errors() {
        let mut info = ContainerInfo::new("nginx:latest");
        info.ports.push("8080:80/tcp".to_string());
        info.volumes.push("/data:/var/lib/data:ro".to_string());
        info.environment.insert("FOO".to_string(), "bar".to_string());
        assert!(info.validate().is_empty());
    }

    #[test]
    fn validation_lists_every_problem() {
        let mut info = ContainerInfo::new("  ");
        info.ports.push("garbage".to_string());
        info.volumes.push("/only-one-part".to_string());
        info.environment.insert("LD_PRELOAD".to_string(), "/tmp/x.so".to_string());
        let errors = info.validate();
        assert_eq!(errors.len(), 4, "{errors:?}");
    }
}
