// ABOUTME: Config values that are either literals or references to environment variables.
// ABOUTME: Keeps secrets such as webhook URLs out of stevedore.yml.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    /// Resolve against the process environment. Call this once while building
    /// runtime collaborators, never mid-deployment.
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }
}

pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<HashMap<String, String>> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> EnvValue {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn literal_resolves_to_itself() {
        assert_eq!(parse("https://hooks.example.com").resolve().unwrap(), "https://hooks.example.com");
    }

    #[test]
    fn env_reference_reads_process_env() {
        temp_env::with_var("STEVEDORE_TEST_WEBHOOK", Some("https://hooks.example.com/x"), || {
            let value = parse("env: STEVEDORE_TEST_WEBHOOK");
            assert_eq!(value.resolve().unwrap(), "https://hooks.example.com/x");
        });
    }

    #[test]
    fn missing_env_falls_back_to_default() {
        temp_env::with_var_unset("STEVEDORE_TEST_UNSET", || {
            let value = parse("env: STEVEDORE_TEST_UNSET\ndefault: fallback");
            assert_eq!(value.resolve().unwrap(), "fallback");

            let err = parse("env: STEVEDORE_TEST_UNSET").resolve().unwrap_err();
            assert!(matches!(err, Error::MissingEnvVar(ref v) if v == "STEVEDORE_TEST_UNSET"));
        });
    }

    #[test]
    fn env_map_resolves_every_entry() {
        temp_env::with_var("STEVEDORE_TEST_TOKEN", Some("s3cret"), || {
            let mut map = HashMap::new();
            map.insert("NODE_ENV".to_string(), parse("production"));
            map.insert("TOKEN".to_string(), parse("env: STEVEDORE_TEST_TOKEN"));

            let resolved = resolve_env_map(&map).unwrap();
            assert_eq!(resolved["NODE_ENV"], "production");
            assert_eq!(resolved["TOKEN"], "s3cret");
        });
    }
}
