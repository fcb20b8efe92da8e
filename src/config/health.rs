// ABOUTME: Health probe configuration.
// ABOUTME: Probe kind, expectations, and the fixed-interval retry budget.

use crate::health::ProbeKind;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub kind: ProbeKind,

    /// Appended to the environment's target URL for HTTP probes.
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    #[serde(default)]
    pub expected_body: Option<String>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Container name for `container` probes.
    #[serde(default)]
    pub container: Option<String>,

    /// Label selector for `pod` probes, e.g. `app=my-app`.
    #[serde(default)]
    pub selector: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            kind: ProbeKind::default(),
            path: default_path(),
            expected_status: default_expected_status(),
            expected_body: None,
            max_attempts: default_max_attempts(),
            interval: default_interval(),
            timeout: default_timeout(),
            container: None,
            selector: None,
            namespace: None,
        }
    }
}

fn default_path() -> String {
    "/health".to_string()
}

fn default_expected_status() -> u16 {
    200
}

fn default_max_attempts() -> u32 {
    30
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}
