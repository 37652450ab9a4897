//! Editable form state for a container task.
//!
//! The presentation layer binds to [`ContainerEditor`]; saving always calls
//! [`ContainerEditor::build`], which produces a whole new [`ContainerInfo`]
//! rather than patching the old one.

use std::collections::BTreeMap;

use crate::{
    command::{join_command, parse_command},
    env::{import_env, EnvImport},
    ports::PortMapping,
    types::{ContainerInfo, RestartPolicy},
    volumes::VolumeMount,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvRow {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerEditor {
    pub image: String,
    pub name: String,
    pub restart_policy: RestartPolicy,
    pub port_rows: Vec<PortMapping>,
    pub volume_rows: Vec<VolumeMount>,
    pub env_rows: Vec<EnvRow>,
    pub command_override: String,
    pub entrypoint_override: String,
    pub network_mode: String,

    // carried through untouched
    compose_project: Option<String>,
    compose_service: Option<String>,
    container_id: Option<String>,
    status: Option<String>,
    created_at: Option<String>,
}

impl ContainerEditor {
    pub fn from_info(info: &ContainerInfo) -> Self {
        Self {
            image: info.image.clone(),
            name: info.name.clone().unwrap_or_default(),
            restart_policy: info.restart_policy,
            port_rows: info.port_mappings(),
            volume_rows: info.volume_mounts(),
            env_rows: info
                .environment
                .iter()
                .map(|(key, value)| EnvRow {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
            command_override: join_command(&info.command),
            entrypoint_override: info
                .entrypoint
                .as_deref()
                .map(join_command)
                .unwrap_or_default(),
            network_mode: info.network_mode.clone().unwrap_or_default(),
            compose_project: info.compose_project.clone(),
            compose_service: info.compose_service.clone(),
            container_id: info.container_id.clone(),
            status: info.status.clone(),
            created_at: info.created_at.clone(),
        }
    }

    /// Merge a `.env` file into the environment rows.
    ///
    /// Rows are rebuilt from the merged map, so a key present both in the rows
    /// and in the file ends up once, with the file's value.
    pub fn import_env_file(&mut self, text: &str) -> EnvImport {
        let mut env = self.env_map();
        let report = import_env(text, &mut env);
        self.env_rows = env
            .into_iter()
            .map(|(key, value)| EnvRow { key, value })
            .collect();
        report
    }

    /// Produce the run spec. Port rows with both ports empty and env rows
    /// with an empty key are dropped.
    pub fn build(&self) -> ContainerInfo {
        let entrypoint = parse_command(&self.entrypoint_override);

        ContainerInfo {
            image: self.image.trim().to_string(),
            name: non_empty(&self.name),
            restart_policy: self.restart_policy,
            ports: self.port_rows.iter().filter_map(PortMapping::to_spec).collect(),
            volumes: self
                .volume_rows
                .iter()
                .filter(|v| !v.host_path.trim().is_empty() && !v.container_path.trim().is_empty())
                .map(VolumeMount::to_string)
                .collect(),
            environment: self.env_map(),
            command: parse_command(&self.command_override),
            entrypoint: (!entrypoint.is_empty()).then_some(entrypoint),
            network_mode: non_empty(&self.network_mode),
            compose_project: self.compose_project.clone(),
            compose_service: self.compose_service.clone(),
            container_id: self.container_id.clone(),
            status: self.status.clone(),
            created_at: self.created_at.clone(),
        }
    }

    fn env_map(&self) -> BTreeMap<String, String> {
        self.env_rows
            .iter()
            .filter(|row| !row.key.trim().is_empty())
            .map(|row| (row.key.trim().to_string(), row.value.clone()))
            .collect()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
