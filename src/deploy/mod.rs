// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Validating -> Dispatching -> HealthChecking -> Succeeded, or RollingBack on failure.

mod attempt;
mod build;
mod error;
mod orchestrator;
mod rollback;
mod state;
mod transitions;

pub use attempt::Attempt;
pub use build::{BuildError, require_artifact, run_build};
pub use error::{AttemptOutcome, DeployError, DeployErrorKind, DeployFailure};
pub use orchestrator::{DeployPlan, DeployReport, DeployRequest, Orchestrator};
pub use rollback::{RollbackPlan, RollbackReport, RollbackRequest};
pub use state::{
    AttemptState, Dispatching, HealthChecking, RollingBack, Succeeded, Validating, Verified,
};
pub use transitions::TransitionResult;

use crate::store::Snapshot;
use crate::strategy::DispatchRequest;

/// Dispatch request that puts a recorded snapshot back in place.
fn restore_request(snapshot: &Snapshot) -> DispatchRequest {
    DispatchRequest {
        environment: snapshot.environment.clone(),
        version: snapshot.version_id.clone(),
        strategy: snapshot.strategy,
        payload: snapshot.payload.clone(),
        restore: true,
    }
}
