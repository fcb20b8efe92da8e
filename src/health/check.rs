// ABOUTME: Single-attempt health checks against real targets.
// ABOUTME: hyper for plain HTTP, curl for HTTPS, tokio for TCP, bollard for containers, kubectl for pods.

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerStateStatusEnum, HealthStatusEnum};
use bollard::query_parameters::InspectContainerOptions;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Uri;
use hyper_util::rt::TokioIo;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

use super::ProbeTarget;
use crate::process::{CommandRunner, ExternalCommand};

/// The result of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub healthy: bool,
    pub detail: String,
}

impl Observation {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// Performs one attempt. Errors are observations, never panics or early returns.
#[async_trait]
pub trait Check: Send + Sync {
    async fn check(&self, target: &ProbeTarget) -> Observation;
}

/// Checks real targets.
pub struct SystemCheck {
    runner: Arc<dyn CommandRunner>,
    attempt_timeout: Duration,
}

impl SystemCheck {
    pub fn new(runner: Arc<dyn CommandRunner>, attempt_timeout: Duration) -> Self {
        Self {
            runner,
            attempt_timeout,
        }
    }

    async fn https(&self, url: &str, expected_status: u16, expected_body: Option<&str>) -> Observation {
        let cmd = ExternalCommand::new("curl")
            .args(["-sS", "-o", "-", "-w", "\n%{http_code}", "--max-time"])
            .arg(self.attempt_timeout.as_secs().max(1).to_string())
            .arg(url)
            .timeout(self.attempt_timeout + Duration::from_secs(5));

        let output = match self.runner.output(&cmd).await {
            Ok(output) => output,
            Err(e) => return Observation::unhealthy(e.to_string()),
        };
        if !output.success() {
            return Observation::unhealthy(format!("curl: {}", output.stderr.trim()));
        }

        let (body, code) = output
            .stdout
            .rsplit_once('\n')
            .unwrap_or(("", output.stdout.as_str()));
        match code.trim().parse::<u16>() {
            Ok(status) => judge_response(status, body, expected_status, expected_body),
            Err(_) => Observation::unhealthy(format!("unreadable status from curl: {code:?}")),
        }
    }

    async fn pod(&self, namespace: &str, selector: &str, context: Option<&str>) -> Observation {
        let mut cmd = ExternalCommand::new("kubectl").timeout(self.attempt_timeout + Duration::from_secs(5));
        if let Some(context) = context {
            cmd = cmd.args(["--context", context]);
        }
        let cmd = cmd.args(["-n", namespace, "get", "pods", "-l", selector, "-o", "json"]);

        match self.runner.run(&cmd).await {
            Ok(output) => judge_pods(&output.stdout),
            Err(e) => Observation::unhealthy(e.to_string()),
        }
    }
}

#[async_trait]
impl Check for SystemCheck {
    async fn check(&self, target: &ProbeTarget) -> Observation {
        match target {
            ProbeTarget::Http {
                url,
                expected_status,
                expected_body,
            } => {
                if url.starts_with("https://") {
                    self.https(url, *expected_status, expected_body.as_deref())
                        .await
                } else {
                    http_get(url, *expected_status, expected_body.as_deref()).await
                }
            }
            ProbeTarget::Tcp { address } => match TcpStream::connect(address.as_str()).await {
                Ok(_) => Observation::healthy(format!("connected to {address}")),
                Err(e) => Observation::unhealthy(format!("connect {address}: {e}")),
            },
            ProbeTarget::Container { name } => container_state(name).await,
            ProbeTarget::Pod {
                namespace,
                selector,
                context,
            } => self.pod(namespace, selector, context.as_deref()).await,
        }
    }
}

/// Plain HTTP GET over a single hyper http1 connection.
pub async fn http_get(url: &str, expected_status: u16, expected_body: Option<&str>) -> Observation {
    match fetch(url).await {
        Ok((status, body)) => judge_response(status, &body, expected_status, expected_body),
        Err(e) => Observation::unhealthy(e),
    }
}

async fn fetch(url: &str) -> Result<(u16, String), String> {
    let uri: Uri = url
        .parse()
        .map_err(|e| format!("invalid url {url}: {e}"))?;
    let host = uri
        .host()
        .ok_or_else(|| format!("url {url} has no host"))?
        .to_string();
    let port = uri.port_u16().unwrap_or(80);

    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|e| format!("connect {host}:{port}: {e}"))?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| format!("HTTP handshake failed: {e}"))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("health probe connection error: {}", e);
        }
    });

    let path = uri.path_and_query().map_or("/", |p| p.as_str());
    let authority = uri
        .authority()
        .map_or_else(|| host.clone(), |a| a.to_string());
    let req = hyper::Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", authority)
        .header("User-Agent", concat!("stevedore/", env!("CARGO_PKG_VERSION")))
        .body(Empty::<Bytes>::new())
        .map_err(|e| format!("failed to build request: {e}"))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let status = resp.status().as_u16();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| format!("failed to read response: {e}"))?
        .to_bytes();

    Ok((status, String::from_utf8_lossy(&body).into_owned()))
}

fn judge_response(
    status: u16,
    body: &str,
    expected_status: u16,
    expected_body: Option<&str>,
) -> Observation {
    if status != expected_status {
        return Observation::unhealthy(format!(
            "status {status}, expected {expected_status}"
        ));
    }
    match expected_body {
        Some(needle) if !body.contains(needle) => {
            Observation::unhealthy(format!("status {status} but body lacks {needle:?}"))
        }
        _ => Observation::healthy(format!("status {status}")),
    }
}

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Local container runtime socket: rootless Podman, rootful Podman, then Docker.
fn local_socket() -> Option<String> {
    let uid = std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status").ok().and_then(|s| {
            s.lines()
                .find(|l| l.starts_with("Uid:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .map(str::to_string)
        })
    });
    let rootless = uid.map(|uid| format!("/run/user/{uid}/podman/podman.sock"));

    rootless
        .into_iter()
        .chain([ROOTFUL_PODMAN.to_string(), DOCKER_SOCKET.to_string()])
        .find(|path| Path::new(path).exists())
}

async fn container_state(name: &str) -> Observation {
    let Some(socket) = local_socket() else {
        return Observation::unhealthy("no container runtime socket found");
    };
    let client = match Docker::connect_with_unix(&socket, 30, bollard::API_DEFAULT_VERSION) {
        Ok(client) => client,
        Err(e) => return Observation::unhealthy(format!("connect {socket}: {e}")),
    };

    let details = match client
        .inspect_container(name, None::<InspectContainerOptions>)
        .await
    {
        Ok(details) => details,
        Err(e) => return Observation::unhealthy(format!("inspect {name}: {e}")),
    };

    let state = details.state.as_ref();
    let running = state.and_then(|s| s.status) == Some(ContainerStateStatusEnum::RUNNING);
    let health = state.and_then(|s| s.health.as_ref()).and_then(|h| h.status);

    match health {
        Some(HealthStatusEnum::HEALTHY) => Observation::healthy(format!("{name} is healthy")),
        Some(HealthStatusEnum::STARTING) => Observation::unhealthy(format!("{name} is starting")),
        Some(HealthStatusEnum::UNHEALTHY) => {
            Observation::unhealthy(format!("{name} reports unhealthy"))
        }
        // No healthcheck defined: running is as good as it gets.
        _ if running => Observation::healthy(format!("{name} is running")),
        _ => Observation::unhealthy(format!("{name} is not running")),
    }
}

/// At least one selected pod must be Running with a Ready condition of True.
fn judge_pods(json: &str) -> Observation {
    let list: serde_json::Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(e) => return Observation::unhealthy(format!("unreadable kubectl output: {e}")),
    };
    let pods = list["items"].as_array().map(Vec::as_slice).unwrap_or_default();
    if pods.is_empty() {
        return Observation::unhealthy("no pods match the selector");
    }

    let ready = pods
        .iter()
        .filter(|pod| {
            let status = &pod["status"];
            status["phase"] == "Running"
                && status["conditions"].as_array().is_some_and(|conditions| {
                    conditions
                        .iter()
                        .any(|c| c["type"] == "Ready" && c["status"] == "True")
                })
        })
        .count();

    let detail = format!("{ready}/{} pods ready", pods.len());
    if ready > 0 {
        Observation::healthy(detail)
    } else {
        Observation::unhealthy(detail)
    }
}
