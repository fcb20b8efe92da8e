// ABOUTME: Generic deployment attempt parameterized by state marker.
// ABOUTME: Attempts live only in memory; success is persisted as a snapshot.

use chrono::{DateTime, Utc};

use super::error::AttemptOutcome;
use super::state::{AttemptState, HealthChecking, Succeeded};
use crate::health::ProbeTarget;
use crate::policy::Policy;
use crate::store::{PayloadRef, Snapshot};
use crate::strategy::{DispatchRequest, StrategyKind};
use crate::types::{EnvironmentName, VersionId};

/// One deployment attempt, parameterized by its current state.
#[derive(Debug)]
pub struct Attempt<S> {
    pub(crate) policy: Policy,
    pub(crate) version: VersionId,
    pub(crate) strategy: StrategyKind,
    pub(crate) payload: PayloadRef,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) state: S,
}

impl<S> Attempt<S> {
    pub fn environment(&self) -> &EnvironmentName {
        &self.policy.name
    }

    pub fn version(&self) -> &VersionId {
        &self.version
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn payload(&self) -> &PayloadRef {
        &self.payload
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn dispatch_request(&self) -> DispatchRequest {
        DispatchRequest {
            environment: self.policy.name.clone(),
            version: self.version.clone(),
            strategy: self.strategy,
            payload: self.payload.clone(),
            restore: false,
        }
    }
}

impl<S: AttemptState> Attempt<S> {
    pub fn outcome(&self) -> AttemptOutcome {
        S::OUTCOME
    }
}

impl Attempt<HealthChecking> {
    pub fn probe_target(&self) -> Option<&ProbeTarget> {
        self.state.probe.as_ref()
    }
}

impl Attempt<Succeeded> {
    pub fn snapshot(&self) -> &Snapshot {
        &self.state.snapshot
    }
}
