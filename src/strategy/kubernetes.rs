// ABOUTME: Kubernetes strategy: point the deployment at the new image and wait for rollout.
// ABOUTME: kubectl set image followed by kubectl rollout status.

use std::time::Duration;

use super::{DispatchError, DispatchRequest, StrategyKind};
use crate::config::KubernetesConfig;
use crate::process::ExternalCommand;
use crate::store::PayloadRef;

/// Extra wall-clock allowance over the rollout timeout kubectl enforces itself.
const ROLLOUT_GRACE: Duration = Duration::from_secs(30);

pub struct KubernetesStrategy {
    config: KubernetesConfig,
    timeout: Duration,
}

impl KubernetesStrategy {
    pub fn new(config: KubernetesConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn kubectl(&self) -> ExternalCommand {
        let mut cmd = ExternalCommand::new("kubectl").timeout(self.timeout);
        if let Some(ref context) = self.config.context {
            cmd = cmd.args(["--context", context.as_str()]);
        }
        cmd.args(["-n", self.config.namespace.as_str()])
    }

    pub fn plan(&self, request: &DispatchRequest) -> Result<Vec<ExternalCommand>, DispatchError> {
        let PayloadRef::Image { ref reference } = request.payload else {
            return Err(DispatchError::PayloadMismatch {
                strategy: StrategyKind::Kubernetes,
                payload: request.payload.to_string(),
            });
        };
        let deployment = format!("deployment/{}", self.config.deployment);

        let set_image = self.kubectl().args([
            "set".to_string(),
            "image".to_string(),
            deployment.clone(),
            format!("{}={}", self.config.container_name(), reference),
        ]);
        let rollout = self
            .kubectl()
            .args([
                "rollout".to_string(),
                "status".to_string(),
                deployment,
                format!("--timeout={}s", self.config.rollout_timeout.as_secs()),
            ])
            .timeout(self.config.rollout_timeout + ROLLOUT_GRACE);

        Ok(vec![set_image, rollout])
    }
}
