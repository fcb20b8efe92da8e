// ABOUTME: Strategy-specific target sections of stevedore.yml.
// ABOUTME: Docker host/container, Kubernetes deployment, and SSH rsync destination.

use super::SshServer;
use crate::types::ImageRef;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    /// Image repository; each deployment is tagged with its version id.
    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageRef,

    pub container: String,

    /// Remote docker daemon, e.g. `ssh://deploy@app.example.com`. Local when unset.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub run_args: Vec<String>,

    #[serde(default = "default_push")]
    pub push: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KubernetesConfig {
    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageRef,

    pub deployment: String,

    /// Container within the pod template; defaults to the deployment name.
    #[serde(default)]
    pub container: Option<String>,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub context: Option<String>,

    #[serde(default = "default_rollout_timeout", with = "humantime_serde")]
    pub rollout_timeout: Duration,
}

impl KubernetesConfig {
    pub fn container_name(&self) -> &str {
        self.container.as_deref().unwrap_or(&self.deployment)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    pub server: SshServer,

    pub remote_dir: String,

    /// Run on the server after the payload is synced.
    #[serde(default)]
    pub restart_command: Option<String>,
}

fn default_push() -> bool {
    true
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_rollout_timeout() -> Duration {
    Duration::from_secs(300)
}

fn deserialize_image_ref<'de, D>(deserializer: D) -> Result<ImageRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ImageRef::parse(&s).map_err(serde::de::Error::custom)
}
