// ABOUTME: Docker strategy: push the tagged image, then replace the running container.
// ABOUTME: Targets a remote daemon through `docker -H` when a host is configured.

use std::time::Duration;

use super::{DispatchError, DispatchRequest, StrategyKind};
use crate::config::DockerConfig;
use crate::process::ExternalCommand;
use crate::store::PayloadRef;

pub struct DockerStrategy {
    config: DockerConfig,
    timeout: Duration,
}

impl DockerStrategy {
    pub fn new(config: DockerConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn docker(&self, remote: bool) -> ExternalCommand {
        let mut cmd = ExternalCommand::new("docker").timeout(self.timeout);
        if let (true, Some(host)) = (remote, self.config.host.as_deref()) {
            cmd = cmd.args(["-H", host]);
        }
        cmd
    }

    pub fn plan(&self, request: &DispatchRequest) -> Result<Vec<ExternalCommand>, DispatchError> {
        let PayloadRef::Image { ref reference } = request.payload else {
            return Err(DispatchError::PayloadMismatch {
                strategy: StrategyKind::Docker,
                payload: request.payload.to_string(),
            });
        };
        let container = self.config.container.as_str();

        let mut commands = Vec::with_capacity(4);
        // Restored images were pushed by the deployment that recorded them.
        if self.config.push && !request.restore {
            commands.push(self.docker(false).args(["push", reference.as_str()]));
        }
        commands.push(self.docker(true).args(["pull", reference.as_str()]));
        commands.push(
            self.docker(true)
                .args(["rm", "-f", container])
                .allow_failure(),
        );
        commands.push(
            self.docker(true)
                .args(["run", "-d", "--name", container])
                .args(self.config.run_args.iter().cloned())
                .args([
                    "--label".to_string(),
                    format!("stevedore.environment={}", request.environment),
                    "--label".to_string(),
                    format!("stevedore.version={}", request.version),
                ])
                .arg(reference.as_str()),
        );
        Ok(commands)
    }
}
