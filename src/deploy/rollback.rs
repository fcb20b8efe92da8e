// ABOUTME: Manual rollback to a recorded snapshot.
// ABOUTME: Re-dispatches the snapshot with its own strategy, health checks it, and marks it.

use serde::Serialize;

use super::error::{DeployError, DeployFailure};
use super::orchestrator::Orchestrator;
use super::restore_request;
use super::transitions::log_mark_failure;
use crate::health::{CancelSignal, ProbeTarget};
use crate::notify::{Event, Notification, Status};
use crate::policy::Policy;
use crate::store::Snapshot;
use crate::types::{EnvironmentName, VersionId};

#[derive(Debug, Clone)]
pub struct RollbackRequest {
    pub environment: String,
    /// Specific version to restore; the previous one when unset.
    pub version: Option<VersionId>,
    pub skip_health: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub snapshot: Snapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_attempts: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackPlan {
    pub environment: EnvironmentName,
    pub target: Snapshot,
    pub commands: Vec<String>,
    pub health_check: Option<String>,
}

impl Orchestrator<'_> {
    /// Restore a recorded snapshot and notify the rollback outcome.
    ///
    /// # Errors
    ///
    /// Lookup failures are storage errors (`VersionNotFound`,
    /// `NoPreviousVersion`) and leave the history untouched. Dispatch and
    /// health failures are `RestoreFailed`.
    pub async fn rollback(
        &self,
        request: &RollbackRequest,
        cancel: &CancelSignal,
    ) -> Result<RollbackReport, DeployFailure> {
        let (policy, target, probe) = self.resolve_rollback(request)?;
        let environment = policy.name.clone();

        let result = self.restore(&policy, target.clone(), probe, cancel).await;

        let (status, detail) = match &result {
            Ok(_) => (Status::Succeeded, None),
            Err(failure) => (Status::Failed, Some(failure.to_string())),
        };
        let notification = Notification::new(
            Event::Rollback,
            status,
            &environment,
            &target.version_id,
            detail.as_deref(),
        );
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::warn!(environment = %environment, "notification not delivered: {}", e);
        }

        result
    }

    /// Resolve the rollback target and describe the work without doing it.
    pub fn rollback_plan(&self, request: &RollbackRequest) -> Result<RollbackPlan, DeployFailure> {
        let (policy, target, probe) = self.resolve_rollback(request)?;
        let commands = self
            .dispatcher
            .plan(&restore_request(&target))
            .map_err(|e| {
                DeployFailure::failed(DeployError::RestoreFailed {
                    version: target.version_id.clone(),
                    reason: e.to_string(),
                })
            })?
            .iter()
            .map(ToString::to_string)
            .collect();

        Ok(RollbackPlan {
            environment: policy.name,
            target,
            commands,
            health_check: probe.as_ref().map(ToString::to_string),
        })
    }

    fn resolve_rollback(
        &self,
        request: &RollbackRequest,
    ) -> Result<(Policy, Snapshot, Option<ProbeTarget>), DeployFailure> {
        let policy = self
            .policies
            .resolve(&request.environment)
            .map_err(|e| DeployFailure::failed(e.into()))?;

        let target = match request.version {
            Some(ref version) => self.store.get(&policy.name, version),
            None => self.store.previous(&policy.name),
        }
        .map_err(|e| DeployFailure::failed(e.into()))?;

        let probe = if policy.skip_health_check || request.skip_health {
            None
        } else {
            Some(
                ProbeTarget::resolve(self.config, policy.target_url.as_deref()).map_err(
                    |source| {
                        DeployFailure::failed(DeployError::MissingHealthTarget {
                            environment: policy.name.clone(),
                            source,
                        })
                    },
                )?,
            )
        };

        Ok((policy, target, probe))
    }

    async fn restore(
        &self,
        policy: &Policy,
        target: Snapshot,
        probe: Option<ProbeTarget>,
        cancel: &CancelSignal,
    ) -> Result<RollbackReport, DeployFailure> {
        let restore_failed = |reason: String| {
            DeployFailure::failed(DeployError::RestoreFailed {
                version: target.version_id.clone(),
                reason,
            })
        };

        tracing::info!(
            environment = %policy.name,
            version = %target.version_id,
            strategy = %target.strategy,
            "restoring snapshot"
        );
        self.dispatcher
            .dispatch(&restore_request(&target))
            .await
            .map_err(|e| restore_failed(e.to_string()))?;

        let health_attempts = match probe {
            Some(ref probe) => Some(
                self.prober
                    .probe(probe, cancel)
                    .await
                    .map_err(|e| restore_failed(e.to_string()))?
                    .attempts,
            ),
            None => None,
        };

        let snapshot = match self
            .store
            .mark_rolled_back_async(&policy.name, &target.version_id)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log_mark_failure(&e);
                target.clone()
            }
        };

        Ok(RollbackReport {
            snapshot,
            health_attempts,
        })
    }
}
