// ABOUTME: Closed set of dispatch strategies (docker, kubernetes, ssh, generic).
// ABOUTME: Strategies plan external commands; the Dispatcher routes by kind and runs them.

mod docker;
mod kubernetes;
mod ssh;

pub use docker::DockerStrategy;
pub use kubernetes::KubernetesStrategy;
pub use ssh::SshStrategy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::process::{CommandRunner, ExternalCommand, ProcessError};
use crate::store::PayloadRef;
use crate::types::{EnvironmentName, VersionId};

/// How an artifact is pushed to and activated on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Docker,
    Kubernetes,
    Ssh,
    /// No push step; artifacts are acknowledged as ready.
    #[default]
    Generic,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Docker => "docker",
            StrategyKind::Kubernetes => "kubernetes",
            StrategyKind::Ssh => "ssh",
            StrategyKind::Generic => "generic",
        };
        write!(f, "{name}")
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(StrategyKind::Docker),
            "kubernetes" | "k8s" => Ok(StrategyKind::Kubernetes),
            "ssh" => Ok(StrategyKind::Ssh),
            "generic" => Ok(StrategyKind::Generic),
            other => Err(format!(
                "unknown strategy '{other}' (expected docker, kubernetes, ssh or generic)"
            )),
        }
    }
}

/// One dispatch of an artifact to an environment.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub environment: EnvironmentName,
    pub version: VersionId,
    pub strategy: StrategyKind,
    pub payload: PayloadRef,
    /// Re-dispatch of a recorded snapshot; the artifact already exists remotely.
    pub restore: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("strategy '{0}' is not configured")]
    NotConfigured(StrategyKind),

    #[error("strategy '{strategy}' cannot deploy payload {payload}")]
    PayloadMismatch {
        strategy: StrategyKind,
        payload: String,
    },

    #[error("dispatch step failed: {0}")]
    Command(#[from] ProcessError),
}

/// Pushes and activates an artifact.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// External commands the dispatch would run, in order.
    fn plan(&self, request: &DispatchRequest) -> Result<Vec<ExternalCommand>, DispatchError>;

    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError>;
}

/// Routes each request to the strategy it names and runs the planned
/// commands one after another, stopping at the first failure.
pub struct Dispatcher {
    docker: Option<DockerStrategy>,
    kubernetes: Option<KubernetesStrategy>,
    ssh: Option<SshStrategy>,
    runner: Arc<dyn CommandRunner>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            docker: None,
            kubernetes: None,
            ssh: None,
            runner,
        }
    }

    /// Configure every strategy that has a section in the config, so that
    /// snapshots recorded under another strategy can still be restored.
    pub fn from_config(config: &Config, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            docker: config
                .docker
                .clone()
                .map(|c| DockerStrategy::new(c, config.command_timeout)),
            kubernetes: config
                .kubernetes
                .clone()
                .map(|c| KubernetesStrategy::new(c, config.command_timeout)),
            ssh: config
                .ssh
                .clone()
                .map(|c| SshStrategy::new(c, config.command_timeout)),
            runner,
        }
    }

    pub fn with_docker(mut self, strategy: DockerStrategy) -> Self {
        self.docker = Some(strategy);
        self
    }

    pub fn with_kubernetes(mut self, strategy: KubernetesStrategy) -> Self {
        self.kubernetes = Some(strategy);
        self
    }

    pub fn with_ssh(mut self, strategy: SshStrategy) -> Self {
        self.ssh = Some(strategy);
        self
    }
}

#[async_trait]
impl Dispatch for Dispatcher {
    fn plan(&self, request: &DispatchRequest) -> Result<Vec<ExternalCommand>, DispatchError> {
        let missing = || DispatchError::NotConfigured(request.strategy);
        match request.strategy {
            StrategyKind::Docker => self.docker.as_ref().ok_or_else(missing)?.plan(request),
            StrategyKind::Kubernetes => self.kubernetes.as_ref().ok_or_else(missing)?.plan(request),
            StrategyKind::Ssh => self.ssh.as_ref().ok_or_else(missing)?.plan(request),
            StrategyKind::Generic => Ok(Vec::new()),
        }
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        let commands = self.plan(request)?;

        if commands.is_empty() {
            tracing::info!(
                environment = %request.environment,
                version = %request.version,
                "artifacts are ready at {}",
                request.payload
            );
            return Ok(());
        }

        for command in &commands {
            tracing::info!(strategy = %request.strategy, "{}", command);
            self.runner.run(command).await?;
        }
        Ok(())
    }
}
