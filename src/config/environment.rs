// ABOUTME: Per-environment policy overrides from stevedore.yml.
// ABOUTME: Every field is optional and layered over the built-in policy defaults.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub auto_deploy: Option<bool>,

    #[serde(default)]
    pub required_approvals: Option<u32>,

    #[serde(default)]
    pub skip_health_check: Option<bool>,

    #[serde(default)]
    pub target_url: Option<String>,
}
