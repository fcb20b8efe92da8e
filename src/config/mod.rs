// ABOUTME: Configuration types and parsing for stevedore.yml.
// ABOUTME: Built once at startup into an immutable Config that is passed by reference.

mod env_value;
mod environment;
mod health;
mod init;
mod server;
mod targets;

pub use env_value::{EnvValue, resolve_env_map};
pub use environment::EnvironmentConfig;
pub use health::HealthConfig;
pub use init::init_config;
pub use server::SshServer;
pub use targets::{DockerConfig, KubernetesConfig, SshConfig};

use crate::error::{Error, Result};
use crate::strategy::StrategyKind;
use crate::types::EnvironmentName;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "stevedore.yml";
pub const CONFIG_FILENAME_ALT: &str = "stevedore.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".stevedore/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub project: String,

    #[serde(default)]
    pub strategy: StrategyKind,

    #[serde(default)]
    pub artifact: ArtifactConfig,

    #[serde(default)]
    pub build: Option<BuildConfig>,

    #[serde(default)]
    pub docker: Option<DockerConfig>,

    #[serde(default)]
    pub kubernetes: Option<KubernetesConfig>,

    #[serde(default)]
    pub ssh: Option<SshConfig>,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub versions: VersionsConfig,

    #[serde(default)]
    pub rollback: RollbackConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    #[serde(default)]
    pub environments: HashMap<String, EnvironmentConfig>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Where the build step leaves a directory artifact.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArtifactConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    pub command: Vec<String>,

    /// Extra environment for the build; values may reference process env vars.
    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default = "default_build_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionsConfig {
    #[serde(default = "default_versions_root")]
    pub root: PathBuf,

    #[serde(default = "default_keep_versions")]
    pub keep: usize,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            root: default_versions_root(),
            keep: default_keep_versions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollbackConfig {
    #[serde(default = "default_true")]
    pub auto: bool,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self { auto: true }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook: Option<EnvValue>,
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(1800)
}

fn default_versions_root() -> PathBuf {
    PathBuf::from(".stevedore/versions")
}

fn default_keep_versions() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                let mut config = Self::load(path)?;
                // `.stevedore/config.yml` still describes the project directory.
                config.base_dir = dir.to_path_buf();
                return Ok(config);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(Error::InvalidConfig("project cannot be empty".to_string()));
        }

        if self.versions.keep == 0 {
            return Err(Error::InvalidConfig(
                "versions.keep must be at least 1".to_string(),
            ));
        }

        if self.health.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "health.max_attempts must be at least 1".to_string(),
            ));
        }

        for name in self.environments.keys() {
            EnvironmentName::new(name).map_err(|e| {
                Error::InvalidConfig(format!("environment '{}': {}", name, e))
            })?;
        }

        if let Some(ref build) = self.build
            && build.command.is_empty()
        {
            return Err(Error::InvalidConfig(
                "build.command cannot be empty".to_string(),
            ));
        }

        let missing = match self.strategy {
            StrategyKind::Docker if self.docker.is_none() => Some("docker"),
            StrategyKind::Kubernetes if self.kubernetes.is_none() => Some("kubernetes"),
            StrategyKind::Ssh if self.ssh.is_none() => Some("ssh"),
            StrategyKind::Ssh if self.artifact.path.is_none() => Some("artifact.path"),
            _ => None,
        };
        if let Some(section) = missing {
            return Err(Error::InvalidConfig(format!(
                "strategy '{}' requires a '{}' section",
                self.strategy, section
            )));
        }

        Ok(())
    }

    /// Resolve a path from the config against the project directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn versions_root(&self) -> PathBuf {
        self.resolve_path(&self.versions.root)
    }

    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.artifact.path.as_deref().map(|p| self.resolve_path(p))
    }

    pub fn template() -> Self {
        Config {
            project: "my-app".to_string(),
            strategy: StrategyKind::Generic,
            artifact: ArtifactConfig {
                path: Some(PathBuf::from("dist")),
            },
            build: None,
            docker: None,
            kubernetes: None,
            ssh: None,
            health: HealthConfig::default(),
            versions: VersionsConfig::default(),
            rollback: RollbackConfig::default(),
            notify: NotifyConfig::default(),
            command_timeout: default_command_timeout(),
            environments: HashMap::new(),
            base_dir: PathBuf::from("."),
        }
    }
}
