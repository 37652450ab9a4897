//! Install-time and discovery-time translation against the container CLI.
//!
//! Install direction: [`ContainerInfo::run_args`] renders the argument list
//! for `<runtime> create`. Discovery direction: [`ContainerInfo::from_inspect`]
//! rebuilds the model from one record of `<runtime> inspect` JSON.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::{
    ports::PortMapping,
    types::{ContainerInfo, RestartPolicy},
    volumes::VolumeMount,
};

pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

impl ContainerInfo {
    /// Arguments for `<runtime> create`, excluding the subcommand itself.
    ///
    /// `labels` are attached verbatim; compose metadata is re-emitted as
    /// labels so that discovery can recover it.
    pub fn run_args(&self, labels: &[(String, String)]) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            args.extend(["--name".to_string(), name.to_string()]);
        }
        args.extend([
            "--restart".to_string(),
            self.restart_policy.as_str().to_string(),
        ]);
        for port in &self.ports {
            if let Some(spec) = PortMapping::parse(port).and_then(|p| p.to_spec()) {
                args.extend(["-p".to_string(), spec]);
            }
        }
        for volume in &self.volumes {
            if let Some(mount) = VolumeMount::parse(volume) {
                args.extend(["-v".to_string(), mount.to_string()]);
            }
        }
        for (key, value) in &self.environment {
            args.extend(["-e".to_string(), format!("{key}={value}")]);
        }
        if let Some(network) = self.network_mode.as_deref().filter(|n| !n.is_empty()) {
            args.extend(["--network".to_string(), network.to_string()]);
        }

        let mut entrypoint_rest: &[String] = &[];
        if let Some(entrypoint) = &self.entrypoint {
            match entrypoint.split_first() {
                Some((first, rest)) => {
                    args.extend(["--entrypoint".to_string(), first.clone()]);
                    entrypoint_rest = rest;
                }
                // An explicit empty entrypoint resets the image default.
                None => args.extend(["--entrypoint".to_string(), String::new()]),
            }
        }

        for (key, value) in labels {
            args.extend(["--label".to_string(), format!("{key}={value}")]);
        }
        if let Some(project) = &self.compose_project {
            args.extend(["--label".to_string(), format!("{COMPOSE_PROJECT_LABEL}={project}")]);
        }
        if let Some(service) = &self.compose_service {
            args.extend(["--label".to_string(), format!("{COMPOSE_SERVICE_LABEL}={service}")]);
        }

        args.push(self.image.clone());
        args.extend(entrypoint_rest.iter().cloned());
        args.extend(self.command.iter().cloned());
        args
    }

    /// Rebuild a [`ContainerInfo`] from one `inspect` record.
    ///
    /// Published ports are rendered into the discovery shape
    /// (`80/tcp -> 0.0.0.0:8080`) and re-parsed, so both read paths share one
    /// parser. Duplicate bindings (IPv4 + IPv6 for the same port) collapse.
    pub fn from_inspect(record: &InspectRecord) -> Self {
        let config = &record.config;
        let host = &record.host_config;

        let mut ports: Vec<String> = Vec::new();
        for (container_port, bindings) in &record.network_settings.ports {
            for binding in bindings.iter().flatten() {
                let line = format!(
                    "{container_port} -> {}:{}",
                    binding.host_ip, binding.host_port
                );
                if let Some(mapping) = PortMapping::parse(&line) {
                    let canonical = mapping.to_string();
                    if !ports.contains(&canonical) {
                        ports.push(canonical);
                    }
                }
            }
        }
        ports.sort();

        let environment: BTreeMap<String, String> = config
            .env
            .iter()
            .flatten()
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let labels = config.labels.clone().unwrap_or_default();
        let network_mode = host
            .network_mode
            .clone()
            .filter(|mode| !mode.is_empty() && mode != "default");

        Self {
            image: config.image.clone(),
            name: Some(record.name.trim_start_matches('/').to_string())
                .filter(|n| !n.is_empty()),
            restart_policy: host
                .restart_policy
                .as_ref()
                .and_then(|p| p.name.parse().ok())
                .unwrap_or(RestartPolicy::No),
            ports,
            volumes: host.binds.clone().unwrap_or_default(),
            environment,
            command: config.cmd.clone().unwrap_or_default(),
            entrypoint: config.entrypoint.clone(),
            network_mode,
            compose_project: labels.get(COMPOSE_PROJECT_LABEL).cloned(),
            compose_service: labels.get(COMPOSE_SERVICE_LABEL).cloned(),
            container_id: Some(record.id.clone()).filter(|id| !id.is_empty()),
            status: record.state.as_ref().map(|s| s.status.clone()),
            created_at: Some(record.created.clone()).filter(|c| !c.is_empty()),
        }
    }
}

// ---------------------------------------------------------------------------
// `inspect` JSON
// ---------------------------------------------------------------------------

/// The subset of `<runtime> inspect` output the translator reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub state: Option<InspectState>,
    #[serde(default)]
    pub config: InspectConfig,
    #[serde(default)]
    pub host_config: InspectHostConfig,
    #[serde(default)]
    pub network_settings: InspectNetworkSettings,
}

impl InspectRecord {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.config.labels.as_ref()?.get(key).map(String::as_str)
    }

    pub fn is_running(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.running)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectState {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub running: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub env: Option<Vec<String>>,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    #[serde(default)]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectHostConfig {
    #[serde(default)]
    pub restart_policy: Option<InspectRestartPolicy>,
    #[serde(default)]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub binds: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectRestartPolicy {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectNetworkSettings {
    /// `"80/tcp" -> [bindings]`; `null` bindings mean exposed but unpublished.
    #[serde(default)]
    pub ports: BTreeMap<String, Option<Vec<InspectPortBinding>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectPortBinding {
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_port: String,
}

/// Parse the JSON array printed by `<runtime> inspect <id>...`.
pub fn parse_inspect(json: &str) -> serde_json::Result<Vec<InspectRecord>> {
    serde_json::from_str(json)
}
