// ABOUTME: State transition methods for deployment attempts.
// ABOUTME: Each method consumes self and returns the next state on success.

use chrono::Utc;
use snafu::ResultExt;
use std::collections::BTreeSet;

use super::attempt::Attempt;
use super::error::{
    DeployError, DeployFailure, DispatchSnafu, MissingHealthTargetSnafu, SourceCheckSnafu,
};
use super::orchestrator::DeployRequest;
use super::state::{Dispatching, HealthChecking, RollingBack, Succeeded, Validating, Verified};
use crate::config::Config;
use crate::health::{CancelSignal, HealthProbe, ProbeTarget};
use crate::policy::PolicyRegistry;
use crate::process::ExternalCommand;
use crate::source::SourceControl;
use crate::store::{Provenance, StoreError, VersionStore};
use crate::strategy::Dispatch;

/// Result type for transitions that may need rollback on failure.
pub type TransitionResult<T, S> = Result<Attempt<T>, (Attempt<S>, DeployError)>;

impl<S> Attempt<S> {
    fn transition<T>(self, state: T) -> Attempt<T> {
        Attempt {
            policy: self.policy,
            version: self.version,
            strategy: self.strategy,
            payload: self.payload,
            started_at: self.started_at,
            state,
        }
    }
}

// =============================================================================
// Validating -> Dispatching
// =============================================================================

impl Attempt<Validating> {
    /// Resolve the environment's policy and open an attempt.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::UnknownEnvironment` for names the registry does not know.
    pub fn begin(request: &DeployRequest, policies: &PolicyRegistry) -> Result<Self, DeployError> {
        let policy = policies.resolve(&request.environment)?;
        Ok(Attempt {
            policy,
            version: request.version.clone(),
            strategy: request.strategy,
            payload: request.payload.clone(),
            started_at: Utc::now(),
            state: Validating,
        })
    }

    /// Pre-flight checks. Nothing has been touched when these fail, so a
    /// validation error never leads to rollback.
    pub async fn validate(
        self,
        request: &DeployRequest,
        source: &dyn SourceControl,
        config: &Config,
    ) -> Result<Attempt<Dispatching>, DeployError> {
        let environment = &self.policy.name;

        if !self.policy.auto_deploy_allowed && !request.force {
            return Err(DeployError::NotAllowed {
                environment: environment.clone(),
            });
        }

        let supplied = request
            .approvals
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect::<BTreeSet<_>>()
            .len() as u32;
        if supplied < self.policy.required_approvals {
            return Err(DeployError::InsufficientApprovals {
                environment: environment.clone(),
                required: self.policy.required_approvals,
                supplied,
            });
        }

        if environment.is_production()
            && !request.force
            && source.is_dirty().await.context(SourceCheckSnafu)?
        {
            return Err(DeployError::DirtyWorkingTree {
                environment: environment.clone(),
            });
        }

        let probe = if self.policy.skip_health_check || request.skip_health {
            None
        } else {
            Some(
                ProbeTarget::resolve(config, self.policy.target_url.as_deref()).context(
                    MissingHealthTargetSnafu {
                        environment: environment.clone(),
                    },
                )?,
            )
        };

        tracing::debug!(environment = %environment, version = %self.version, "validation passed");
        Ok(self.transition(Dispatching { probe }))
    }
}

// =============================================================================
// Dispatching -> HealthChecking
// =============================================================================

impl Attempt<Dispatching> {
    /// Commands a dispatch would run, without running them.
    pub fn plan(&self, dispatcher: &dyn Dispatch) -> Result<Vec<ExternalCommand>, DeployError> {
        dispatcher
            .plan(&self.dispatch_request())
            .context(DispatchSnafu {
                version: self.version.clone(),
            })
    }

    pub fn probe_target(&self) -> Option<&ProbeTarget> {
        self.state.probe.as_ref()
    }

    /// Push and activate the artifact.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow rollback.
    #[must_use = "attempt state must be used"]
    pub async fn dispatch(
        self,
        dispatcher: &dyn Dispatch,
    ) -> TransitionResult<HealthChecking, Dispatching> {
        tracing::info!(
            environment = %self.policy.name,
            version = %self.version,
            strategy = %self.strategy,
            "dispatching"
        );

        match dispatcher.dispatch(&self.dispatch_request()).await {
            Ok(()) => {
                let probe = self.state.probe.clone();
                Ok(self.transition(HealthChecking { probe }))
            }
            Err(source) => {
                let err = DeployError::Dispatch {
                    version: self.version.clone(),
                    source,
                };
                Err((self, err))
            }
        }
    }

    /// Give up on this attempt and restore the last good version.
    #[must_use = "attempt state must be used"]
    pub fn rollback(self) -> Attempt<RollingBack> {
        self.transition(RollingBack)
    }
}

// =============================================================================
// HealthChecking -> Verified
// =============================================================================

impl Attempt<HealthChecking> {
    /// Wait for the target to report healthy.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on exhaustion or cancellation to allow rollback.
    #[must_use = "attempt state must be used"]
    pub async fn verify(
        self,
        prober: &dyn HealthProbe,
        cancel: &CancelSignal,
    ) -> TransitionResult<Verified, HealthChecking> {
        let Some(ref target) = self.state.probe else {
            tracing::info!(environment = %self.policy.name, "health check skipped");
            return Ok(self.transition(Verified { health: None }));
        };

        tracing::info!(environment = %self.policy.name, probe = %target, "waiting for healthy");
        match prober.probe(target, cancel).await {
            Ok(report) => Ok(self.transition(Verified {
                health: Some(report),
            })),
            Err(source) => {
                let err = DeployError::Health {
                    version: self.version.clone(),
                    source,
                };
                Err((self, err))
            }
        }
    }

    /// Give up on this attempt and restore the last good version.
    #[must_use = "attempt state must be used"]
    pub fn rollback(self) -> Attempt<RollingBack> {
        self.transition(RollingBack)
    }
}

// =============================================================================
// Verified -> Succeeded
// =============================================================================

impl Attempt<Verified> {
    /// Record the deployment in the version history.
    ///
    /// The artifact is live at this point; a storage failure is reported
    /// without rolling back.
    pub async fn record(
        self,
        store: &VersionStore,
        provenance: &Provenance,
    ) -> Result<Attempt<Succeeded>, DeployError> {
        let snapshot = store
            .save_async(
                &self.policy.name,
                &self.version,
                &self.payload,
                self.strategy,
                provenance,
            )
            .await?;
        let health = self.state.health.clone();
        Ok(self.transition(Succeeded { snapshot, health }))
    }
}

// =============================================================================
// RollingBack -> RolledBack | Failed
// =============================================================================

impl Attempt<RollingBack> {
    /// Automatic rollback disabled: fail with the original error.
    pub fn abandon(self, cause: DeployError) -> DeployFailure {
        tracing::warn!(
            environment = %self.policy.name,
            "automatic rollback disabled; {} left as dispatched",
            self.version
        );
        DeployFailure::failed(cause)
    }

    /// Re-dispatch the last known good snapshot with the strategy it was
    /// deployed with.
    ///
    /// Success reports `cause` with outcome `RolledBack`. A failed rollback
    /// reports `RollbackFailed` with `cause` as its source.
    pub async fn restore(
        self,
        store: &VersionStore,
        dispatcher: &dyn Dispatch,
        cause: DeployError,
    ) -> DeployFailure {
        let environment = &self.policy.name;

        let target = match store.restore_target(environment, &self.version) {
            Ok(target) => target,
            Err(reason) => {
                tracing::warn!(environment = %environment, "nothing to roll back to: {}", reason);
                return DeployFailure::failed(DeployError::RollbackUnavailable {
                    reason,
                    source: Box::new(cause),
                });
            }
        };

        tracing::warn!(
            environment = %environment,
            failed = %self.version,
            restore_to = %target.version_id,
            strategy = %target.strategy,
            "rolling back"
        );

        let request = super::restore_request(&target);
        if let Err(e) = dispatcher.dispatch(&request).await {
            return DeployFailure::failed(DeployError::RollbackFailed {
                version: target.version_id,
                reason: e.to_string(),
                source: Box::new(cause),
            });
        }

        if let Err(e) = store
            .mark_rolled_back_async(environment, &target.version_id)
            .await
        {
            log_mark_failure(&e);
        }

        DeployFailure::rolled_back(cause, target.version_id)
    }
}

pub(super) fn log_mark_failure(err: &StoreError) {
    tracing::warn!("restored version could not be marked as rolled back: {}", err);
}
