// ABOUTME: Environment policy resolution (dev, staging, prod, or configured).
// ABOUTME: Pure lookup from environment name to an immutable Policy value.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::config::EnvironmentConfig;
use crate::types::EnvironmentName;

/// Static ruleset governing whether and how a deployment may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: EnvironmentName,
    pub auto_deploy_allowed: bool,
    pub required_approvals: u32,
    pub skip_health_check: bool,
    pub target_url: Option<String>,
}

impl Policy {
    fn permissive(name: EnvironmentName) -> Self {
        Self {
            name,
            auto_deploy_allowed: true,
            required_approvals: 0,
            skip_health_check: false,
            target_url: None,
        }
    }

    fn apply(&mut self, overrides: &EnvironmentConfig) {
        if let Some(auto) = overrides.auto_deploy {
            self.auto_deploy_allowed = auto;
        }
        if let Some(approvals) = overrides.required_approvals {
            self.required_approvals = approvals;
        }
        if let Some(skip) = overrides.skip_health_check {
            self.skip_health_check = skip;
        }
        if overrides.target_url.is_some() {
            self.target_url = overrides.target_url.clone();
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),
}

/// Registry of known environment policies.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: BTreeMap<EnvironmentName, Policy>,
}

impl PolicyRegistry {
    /// The hardcoded dev/staging/prod defaults.
    pub fn builtin() -> Self {
        let mut policies = BTreeMap::new();
        for (name, auto, approvals) in [("dev", true, 0), ("staging", true, 0), ("prod", false, 1)]
        {
            let Ok(name) = EnvironmentName::new(name) else {
                continue;
            };
            let mut policy = Policy::permissive(name.clone());
            policy.auto_deploy_allowed = auto;
            policy.required_approvals = approvals;
            policies.insert(name, policy);
        }
        Self { policies }
    }

    /// Layer configured environments over the built-in defaults.
    ///
    /// Names are validated when the config is loaded; an invalid one here is
    /// skipped with a warning.
    pub fn with_overrides(mut self, overrides: &HashMap<String, EnvironmentConfig>) -> Self {
        for (raw, env_config) in overrides {
            let name = match EnvironmentName::new(raw) {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!("ignoring environment '{}': {}", raw, e);
                    continue;
                }
            };
            self.policies
                .entry(name.clone())
                .or_insert_with(|| Policy::permissive(name))
                .apply(env_config);
        }
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Policy, PolicyError> {
        EnvironmentName::new(name)
            .ok()
            .and_then(|name| self.policies.get(&name))
            .cloned()
            .ok_or_else(|| PolicyError::UnknownEnvironment(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &EnvironmentName> {
        self.policies.keys()
    }
}
