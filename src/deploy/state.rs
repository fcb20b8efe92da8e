// ABOUTME: Attempt state marker types for the type state pattern.
// ABOUTME: States carry the data that only exists from that point of the lifecycle on.

use super::error::AttemptOutcome;
use crate::health::{ProbeReport, ProbeTarget};
use crate::store::Snapshot;

/// Lifecycle position of an attempt.
pub trait AttemptState {
    const OUTCOME: AttemptOutcome;
}

/// Policy resolved, pre-flight checks pending.
/// Available actions: `validate()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Validating;

/// Checks passed, nothing dispatched yet.
/// Available actions: `plan()`, `dispatch()`, `rollback()`
#[derive(Debug, Clone)]
pub struct Dispatching {
    /// `None` when the health check is skipped.
    pub(crate) probe: Option<ProbeTarget>,
}

/// Artifact dispatched.
/// Available actions: `verify()`, `rollback()`
#[derive(Debug, Clone)]
pub struct HealthChecking {
    pub(crate) probe: Option<ProbeTarget>,
}

/// Healthy (or health check skipped).
/// Available actions: `record()`
#[derive(Debug, Clone)]
pub struct Verified {
    pub(crate) health: Option<ProbeReport>,
}

/// Snapshot recorded.
/// Available actions: `snapshot()`
#[derive(Debug, Clone)]
pub struct Succeeded {
    pub(crate) snapshot: Snapshot,
    pub(crate) health: Option<ProbeReport>,
}

/// Dispatch or health check failed.
/// Available actions: `restore()`, `abandon()`
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingBack;

impl AttemptState for Validating {
    const OUTCOME: AttemptOutcome = AttemptOutcome::Pending;
}

impl AttemptState for Dispatching {
    const OUTCOME: AttemptOutcome = AttemptOutcome::Pending;
}

impl AttemptState for HealthChecking {
    const OUTCOME: AttemptOutcome = AttemptOutcome::Pending;
}

impl AttemptState for Verified {
    const OUTCOME: AttemptOutcome = AttemptOutcome::Pending;
}

impl AttemptState for Succeeded {
    const OUTCOME: AttemptOutcome = AttemptOutcome::Success;
}

impl AttemptState for RollingBack {
    const OUTCOME: AttemptOutcome = AttemptOutcome::Pending;
}
