// ABOUTME: Drives a deployment attempt from validation to a terminal outcome.
// ABOUTME: Owns no I/O itself; every effect goes through an injected collaborator.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::attempt::Attempt;
use super::error::{AttemptOutcome, DeployFailure};
use super::state::{RollingBack, Validating};
use crate::config::Config;
use crate::health::{CancelSignal, HealthProbe};
use crate::notify::{Event, Notification, Notifier, Status};
use crate::policy::PolicyRegistry;
use crate::source::SourceControl;
use crate::store::{PayloadRef, Snapshot, VersionStore};
use crate::strategy::{Dispatch, StrategyKind};
use crate::types::{EnvironmentName, VersionId};

/// What the caller asked for.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub environment: String,
    pub version: VersionId,
    pub strategy: StrategyKind,
    pub payload: PayloadRef,
    /// Overrides disabled auto-deploy and the dirty-tree check.
    pub force: bool,
    pub skip_health: bool,
    pub approvals: Vec<String>,
    /// Restore the last good version when dispatch or health check fails.
    pub rollback: bool,
}

/// A successful deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub snapshot: Snapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_attempts: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

/// What a deployment would do.
#[derive(Debug, Clone, Serialize)]
pub struct DeployPlan {
    pub environment: EnvironmentName,
    pub version: VersionId,
    pub strategy: StrategyKind,
    pub payload: PayloadRef,
    pub commands: Vec<String>,
    /// `None` when the health check would be skipped.
    pub health_check: Option<String>,
    /// Snapshots retention would delete after recording this version.
    pub evicts: Vec<VersionId>,
}

/// Sequences validation, dispatch, health check, recording and rollback.
pub struct Orchestrator<'a> {
    pub(crate) config: &'a Config,
    pub(crate) policies: PolicyRegistry,
    pub(crate) store: &'a VersionStore,
    pub(crate) dispatcher: &'a dyn Dispatch,
    pub(crate) prober: &'a dyn HealthProbe,
    pub(crate) notifier: &'a dyn Notifier,
    pub(crate) source: &'a dyn SourceControl,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a VersionStore,
        dispatcher: &'a dyn Dispatch,
        prober: &'a dyn HealthProbe,
        notifier: &'a dyn Notifier,
        source: &'a dyn SourceControl,
    ) -> Self {
        Self {
            config,
            policies: PolicyRegistry::builtin().with_overrides(&config.environments),
            store,
            dispatcher,
            prober,
            notifier,
            source,
        }
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    /// Run one attempt to a terminal state and notify its outcome.
    pub async fn deploy(
        &self,
        request: &DeployRequest,
        cancel: &CancelSignal,
    ) -> Result<DeployReport, DeployFailure> {
        let result = self.run(request, cancel).await;
        self.announce(request, result.as_ref().err()).await;
        result
    }

    /// Notify a failure that happened around `deploy` rather than inside it,
    /// such as a rejected plan or a failed build.
    pub async fn fail(&self, request: &DeployRequest, failure: DeployFailure) -> DeployFailure {
        self.announce(request, Some(&failure)).await;
        failure
    }

    /// Validate exactly as `deploy` does, then describe the work without doing it.
    pub async fn plan(&self, request: &DeployRequest) -> Result<DeployPlan, DeployFailure> {
        let attempt = Attempt::<Validating>::begin(request, &self.policies)
            .map_err(DeployFailure::failed)?
            .validate(request, self.source, self.config)
            .await
            .map_err(DeployFailure::failed)?;

        let commands = attempt
            .plan(self.dispatcher)
            .map_err(DeployFailure::failed)?
            .iter()
            .map(ToString::to_string)
            .collect();

        let keep = self.store.keep_versions().saturating_sub(1);
        let evicts = self
            .store
            .list(attempt.environment())
            .map_err(|e| DeployFailure::failed(e.into()))?
            .into_iter()
            .filter(|s| &s.version_id != attempt.version())
            .skip(keep)
            .map(|s| s.version_id)
            .collect();

        Ok(DeployPlan {
            environment: attempt.environment().clone(),
            version: attempt.version().clone(),
            strategy: attempt.strategy(),
            payload: attempt.payload().clone(),
            commands,
            health_check: attempt.probe_target().map(ToString::to_string),
            evicts,
        })
    }

    async fn run(
        &self,
        request: &DeployRequest,
        cancel: &CancelSignal,
    ) -> Result<DeployReport, DeployFailure> {
        let attempt = Attempt::<Validating>::begin(request, &self.policies)
            .map_err(DeployFailure::failed)?;
        tracing::info!(
            environment = %attempt.environment(),
            version = %attempt.version(),
            strategy = %attempt.strategy(),
            "deployment started"
        );

        let attempt = attempt
            .validate(request, self.source, self.config)
            .await
            .map_err(DeployFailure::failed)?;

        let attempt = match attempt.dispatch(self.dispatcher).await {
            Ok(next) => next,
            Err((failed, err)) => return Err(self.recover(failed.rollback(), err, request).await),
        };

        let attempt = match attempt.verify(self.prober, cancel).await {
            Ok(next) => next,
            Err((failed, err)) => return Err(self.recover(failed.rollback(), err, request).await),
        };

        let provenance = self.source.provenance().await;
        let attempt = attempt
            .record(self.store, &provenance)
            .await
            .map_err(DeployFailure::failed)?;

        tracing::info!(
            environment = %attempt.environment(),
            version = %attempt.version(),
            "deployment succeeded"
        );
        Ok(DeployReport {
            snapshot: attempt.snapshot().clone(),
            health_attempts: attempt.state.health.as_ref().map(|h| h.attempts),
            started_at: attempt.started_at(),
            outcome: attempt.outcome(),
        })
    }

    async fn recover(
        &self,
        attempt: Attempt<RollingBack>,
        cause: super::DeployError,
        request: &DeployRequest,
    ) -> DeployFailure {
        tracing::error!(environment = %attempt.environment(), "{}", cause);
        if request.rollback && self.config.rollback.auto {
            attempt.restore(self.store, self.dispatcher, cause).await
        } else {
            attempt.abandon(cause)
        }
    }

    async fn announce(&self, request: &DeployRequest, failure: Option<&DeployFailure>) {
        // An unresolvable environment name never started an attempt.
        let Ok(environment) = EnvironmentName::new(&request.environment) else {
            return;
        };

        let notification = match failure {
            None => Notification::new(
                Event::Deployment,
                Status::Succeeded,
                &environment,
                &request.version,
                None,
            ),
            Some(failure) => {
                let detail = failure.to_string();
                Notification::new(
                    Event::Deployment,
                    Status::Failed,
                    &environment,
                    &request.version,
                    Some(&detail),
                )
            }
        };

        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::warn!(environment = %environment, "notification not delivered: {}", e);
        }
    }
}
