use serde::{Deserialize, Serialize};

/// `hostPath:containerPath[:mode...]`
///
/// Trailing parts (e.g. `ro`, `z`) carry no structural meaning here but are
/// kept so the canonical string round-trips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl VolumeMount {
    pub fn new(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            options: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split(':');
        let host_path = parts.next()?.to_string();
        let container_path = parts.next()?.to_string();
        Some(Self {
            host_path,
            container_path,
            options: parts.map(str::to_string).collect(),
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.options.iter().any(|o| o.split(',').any(|flag| flag == "ro"))
    }
}

impl std::fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host_path, self.container_path)?;
        for option in &self.options {
            write!(f, ":{option}")?;
        }
        Ok(())
    }
}
