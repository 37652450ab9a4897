use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LABEL_PREFIX: &str = "com.runcast";
pub const DEFAULT_VM_PREFIX: &str = "runcast-";
pub const DEFAULT_VM_TEMPLATE: &str = "template://default";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const MAX_TIMEOUT_SECS: u64 = 3_600; // one hour hard ceiling for run-now
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 30_000;

/// Top-level config (runcast.toml + RUNCAST_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuncastConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub launchd: LaunchdConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub vm: VmConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    /// Create the directory that will hold the database file.
    pub fn ensure_parent_dir(&self) -> crate::error::Result<()> {
        if let Some(parent) = std::path::Path::new(&self.path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Calendar/interval daemon manager (launchd user agents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchdConfig {
    #[serde(default = "default_agents_dir")]
    pub agents_dir: String,
    /// Reverse-DNS prefix; descriptors are named `<prefix>.<task-id>.plist`.
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
    #[serde(default = "default_launchctl")]
    pub launchctl: String,
    #[serde(default = "default_plutil")]
    pub plutil: String,
}

impl Default for LaunchdConfig {
    fn default() -> Self {
        Self {
            agents_dir: default_agents_dir(),
            label_prefix: default_label_prefix(),
            launchctl: default_launchctl(),
            plutil: default_plutil(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    #[serde(default = "default_crontab")]
    pub binary: String,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            binary: default_crontab(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// `docker` or any CLI-compatible runtime such as `podman`.
    #[serde(default = "default_container_binary")]
    pub binary: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            binary: default_container_binary(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmConfig {
    #[serde(default = "default_vm_binary")]
    pub binary: String,
    /// Only instances whose name starts with this prefix are discovered.
    #[serde(default = "default_vm_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_vm_template")]
    pub default_template: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            binary: default_vm_binary(),
            name_prefix: default_vm_prefix(),
            default_template: default_vm_template(),
        }
    }
}

/// Bounds applied to out-of-band `run_now` executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

impl ExecutionConfig {
    /// Configured timeout clamped to [`MAX_TIMEOUT_SECS`]; zero falls back to the default.
    pub fn effective_timeout_secs(&self) -> u64 {
        match self.timeout_secs {
            0 => DEFAULT_TIMEOUT_SECS,
            n => n.min(MAX_TIMEOUT_SECS),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}

fn default_db_path() -> String {
    format!("{}/.runcast/runcast.db", home_dir())
}

fn default_agents_dir() -> String {
    format!("{}/Library/LaunchAgents", home_dir())
}

fn default_label_prefix() -> String {
    DEFAULT_LABEL_PREFIX.to_string()
}

fn default_launchctl() -> String {
    "launchctl".to_string()
}

fn default_plutil() -> String {
    "plutil".to_string()
}

fn default_crontab() -> String {
    "crontab".to_string()
}

fn default_container_binary() -> String {
    "docker".to_string()
}

fn default_vm_binary() -> String {
    "limactl".to_string()
}

fn default_vm_prefix() -> String {
    DEFAULT_VM_PREFIX.to_string()
}

fn default_vm_template() -> String {
    DEFAULT_VM_TEMPLATE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_output_chars() -> usize {
    DEFAULT_MAX_OUTPUT_CHARS
}

impl RuncastConfig {
    /// Load config from a TOML file with RUNCAST_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.runcast/runcast.toml
    ///
    /// A missing file is not an error; every section falls back to its defaults.
    /// Nested env keys use a double underscore: `RUNCAST_EXECUTION__TIMEOUT_SECS=60`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: RuncastConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("RUNCAST_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        tracing::debug!(%path, "configuration loaded");
        Ok(config)
    }
}

fn default_config_path() -> String {
    format!("{}/.runcast/runcast.toml", home_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = RuncastConfig::load(Some("/nonexistent/runcast.toml")).unwrap();
        assert_eq!(config.launchd.label_prefix, DEFAULT_LABEL_PREFIX);
        assert_eq!(config.container.binary, "docker");
        assert_eq!(config.vm.name_prefix, DEFAULT_VM_PREFIX);
    }

    #[test]
    fn toml_sections_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runcast.toml");
        std::fs::write(
            &path,
            "[container]\nbinary = \"podman\"\n\n[execution]\ntimeout_secs = 45\n",
        )
        .unwrap();

        let config = RuncastConfig::load(path.to_str()).unwrap();
        assert_eq!(config.container.binary, "podman");
        assert_eq!(config.execution.timeout_secs, 45);
        // untouched sections keep defaults
        assert_eq!(config.cron.binary, "crontab");
        assert_eq!(config.execution.max_output_chars, DEFAULT_MAX_OUTPUT_CHARS);
    }

    #[test]
    fn database_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseConfig {
            path: dir.path().join("nested/state/runcast.db").to_string_lossy().into_owned(),
        };
        db.ensure_parent_dir().unwrap();
        assert!(dir.path().join("nested/state").is_dir());

        // a regular file where the directory should go
        std::fs::write(dir.path().join("blocker"), "").unwrap();
        let blocked = DatabaseConfig {
            path: dir.path().join("blocker/runcast.db").to_string_lossy().into_owned(),
        };
        assert_eq!(blocked.ensure_parent_dir().unwrap_err().code(), "IO_ERROR");
    }

    #[test]
    fn timeout_is_clamped() {
        let exec = ExecutionConfig {
            timeout_secs: 99_999,
            max_output_chars: 10,
        };
        assert_eq!(exec.effective_timeout_secs(), MAX_TIMEOUT_SECS);

        let zero = ExecutionConfig {
            timeout_secs: 0,
            max_output_chars: 10,
        };
        assert_eq!(zero.effective_timeout_secs(), DEFAULT_TIMEOUT_SECS);
    }
}
