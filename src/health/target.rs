// ABOUTME: What a health probe inspects, resolved from config and the environment policy.
// ABOUTME: HTTP endpoint, TCP port, local container, or orchestrator pods.

use serde::Deserialize;
use std::fmt;

use super::HealthError;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Http,
    Tcp,
    Container,
    #[serde(alias = "orchestrator-pod")]
    Pod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    Http {
        url: String,
        expected_status: u16,
        expected_body: Option<String>,
    },
    Tcp {
        address: String,
    },
    Container {
        name: String,
    },
    Pod {
        namespace: String,
        selector: String,
        context: Option<String>,
    },
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeTarget::Http { url, .. } => write!(f, "{url}"),
            ProbeTarget::Tcp { address } => write!(f, "tcp://{address}"),
            ProbeTarget::Container { name } => write!(f, "container {name}"),
            ProbeTarget::Pod {
                namespace,
                selector,
                ..
            } => write!(f, "pods {selector} in {namespace}"),
        }
    }
}

impl ProbeTarget {
    /// Build the probe target for an environment whose policy points at `target_url`.
    pub fn resolve(config: &Config, target_url: Option<&str>) -> Result<Self, HealthError> {
        let health = &config.health;
        let require_url = || {
            target_url.map(str::trim).filter(|u| !u.is_empty()).ok_or_else(|| {
                HealthError::InvalidTarget(format!(
                    "{} probes need a target_url for the environment",
                    kind_name(health.kind)
                ))
            })
        };

        match health.kind {
            ProbeKind::Http => {
                let base = require_url()?;
                let base = if base.contains("://") {
                    base.to_string()
                } else {
                    format!("http://{base}")
                };
                Ok(ProbeTarget::Http {
                    url: join_url(&base, &health.path),
                    expected_status: health.expected_status,
                    expected_body: health.expected_body.clone(),
                })
            }
            ProbeKind::Tcp => {
                let url = require_url()?;
                let address = url.split_once("://").map_or(url, |(_, rest)| rest);
                let address = address.trim_end_matches('/');
                if !address.contains(':') {
                    return Err(HealthError::InvalidTarget(format!(
                        "tcp target '{address}' must include a port"
                    )));
                }
                Ok(ProbeTarget::Tcp {
                    address: address.to_string(),
                })
            }
            ProbeKind::Container => {
                let name = health
                    .container
                    .clone()
                    .or_else(|| config.docker.as_ref().map(|d| d.container.clone()))
                    .ok_or_else(|| {
                        HealthError::InvalidTarget(
                            "container probes need health.container or a docker section"
                                .to_string(),
                        )
                    })?;
                Ok(ProbeTarget::Container { name })
            }
            ProbeKind::Pod => {
                let k8s = config.kubernetes.as_ref();
                let selector = health
                    .selector
                    .clone()
                    .or_else(|| k8s.map(|k| format!("app={}", k.deployment)))
                    .ok_or_else(|| {
                        HealthError::InvalidTarget(
                            "pod probes need health.selector or a kubernetes section".to_string(),
                        )
                    })?;
                let namespace = health
                    .namespace
                    .clone()
                    .or_else(|| k8s.map(|k| k.namespace.clone()))
                    .unwrap_or_else(|| "default".to_string());
                Ok(ProbeTarget::Pod {
                    namespace,
                    selector,
                    context: k8s.and_then(|k| k.context.clone()),
                })
            }
        }
    }
}

fn kind_name(kind: ProbeKind) -> &'static str {
    match kind {
        ProbeKind::Http => "http",
        ProbeKind::Tcp => "tcp",
        ProbeKind::Container => "container",
        ProbeKind::Pod => "pod",
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        Config::from_yaml(yaml).unwrap()
    }

    #[test]
    fn http_target_joins_path() {
        let cfg = config("project: shop\n");
        let target = ProbeTarget::resolve(&cfg, Some("https://staging.example.com/")).unwrap();
        assert_eq!(
            target,
            ProbeTarget::Http {
                url: "https://staging.example.com/health".to_string(),
                expected_status: 200,
                expected_body: None,
            }
        );
    }

    #[test]
    fn http_target_defaults_to_plain_http() {
        let cfg = config("project: shop\n");
        let target = ProbeTarget::resolve(&cfg, Some("localhost:8080")).unwrap();
        assert_eq!(target.to_string(), "http://localhost:8080/health");
    }

    #[test]
    fn http_target_requires_url() {
        let cfg = config("project: shop\n");
        let err = ProbeTarget::resolve(&cfg, None).unwrap_err();
        assert!(matches!(err, HealthError::InvalidTarget(_)));
    }

    #[test]
    fn tcp_target_strips_scheme() {
        let cfg = config("project: shop\nhealth:\n  kind: tcp\n");
        let target = ProbeTarget::resolve(&cfg, Some("tcp://db.internal:5432")).unwrap();
        assert_eq!(
            target,
            ProbeTarget::Tcp {
                address: "db.internal:5432".to_string()
            }
        );
    }

    #[test]
    fn pod_target_falls_back_to_deployment_label() {
        let cfg = config(
            "project: shop\nstrategy: kubernetes\nkubernetes:\n  image: ghcr.io/acme/api\n  deployment: api\n  namespace: shop\nhealth:\n  kind: orchestrator-pod\n",
        );
        let target = ProbeTarget::resolve(&cfg, None).unwrap();
        assert_eq!(
            target,
            ProbeTarget::Pod {
                namespace: "shop".to_string(),
                selector: "app=api".to_string(),
                context: None,
            }
        );
    }
}
