// ABOUTME: Deployment error types with the SNAFU pattern.
// ABOUTME: Categorised by kind() so the CLI can map each failure to a stable exit code.

use serde::Serialize;
use snafu::Snafu;
use std::fmt;

use super::build::BuildError;
use crate::health::HealthError;
use crate::policy::PolicyError;
use crate::source::SourceError;
use crate::store::StoreError;
use crate::strategy::DispatchError;
use crate::types::{EnvironmentName, VersionId};

/// Errors that end a deployment or rollback attempt.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DeployError {
    #[snafu(display("{source}"))]
    UnknownEnvironment { source: PolicyError },

    #[snafu(display("automatic deployment to {environment} is disabled; pass --force to deploy"))]
    NotAllowed { environment: EnvironmentName },

    #[snafu(display(
        "{environment} requires {required} approval(s) but {supplied} were given (use --approve)"
    ))]
    InsufficientApprovals {
        environment: EnvironmentName,
        required: u32,
        supplied: u32,
    },

    #[snafu(display(
        "working tree has uncommitted changes; commit them or pass --force to deploy to {environment}"
    ))]
    DirtyWorkingTree { environment: EnvironmentName },

    #[snafu(display("could not inspect the working tree: {source}"))]
    SourceCheck { source: SourceError },

    #[snafu(display("{environment} cannot be health checked: {source}"))]
    MissingHealthTarget {
        environment: EnvironmentName,
        source: HealthError,
    },

    #[snafu(display("build failed: {source}"))]
    Build { source: BuildError },

    #[snafu(display("dispatch of {version} failed: {source}"))]
    Dispatch {
        version: VersionId,
        source: DispatchError,
    },

    #[snafu(display("{version} did not become healthy: {source}"))]
    Health {
        version: VersionId,
        source: HealthError,
    },

    #[snafu(display("{source}; rollback unavailable: {reason}"))]
    RollbackUnavailable {
        reason: StoreError,
        source: Box<DeployError>,
    },

    #[snafu(display("rollback to {version} failed ({reason}) after: {source}"))]
    RollbackFailed {
        version: VersionId,
        reason: String,
        source: Box<DeployError>,
    },

    #[snafu(display("restoring {version} failed: {reason}"))]
    RestoreFailed { version: VersionId, reason: String },

    #[snafu(display("version history error: {source}"))]
    Storage { source: StoreError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    /// Rejected before any side effect.
    Validation,
    Build,
    Dispatch,
    Health,
    /// Restoring a previous version failed.
    Rollback,
    Storage,
}

impl DeployError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::UnknownEnvironment { .. }
            | DeployError::NotAllowed { .. }
            | DeployError::InsufficientApprovals { .. }
            | DeployError::DirtyWorkingTree { .. }
            | DeployError::SourceCheck { .. }
            | DeployError::MissingHealthTarget { .. } => DeployErrorKind::Validation,
            DeployError::Build { .. } => DeployErrorKind::Build,
            DeployError::Dispatch { .. } => DeployErrorKind::Dispatch,
            DeployError::Health { .. } => DeployErrorKind::Health,
            // `original()` still reaches the dispatch or health failure.
            DeployError::RollbackUnavailable { .. }
            | DeployError::RollbackFailed { .. }
            | DeployError::RestoreFailed { .. } => DeployErrorKind::Rollback,
            DeployError::Storage { .. } => DeployErrorKind::Storage,
        }
    }

    /// The failure that started the attempt's unhappy path.
    pub fn original(&self) -> &DeployError {
        match self {
            DeployError::RollbackUnavailable { source, .. }
            | DeployError::RollbackFailed { source, .. } => source.original(),
            other => other,
        }
    }
}

impl From<StoreError> for DeployError {
    fn from(source: StoreError) -> Self {
        DeployError::Storage { source }
    }
}

impl From<PolicyError> for DeployError {
    fn from(source: PolicyError) -> Self {
        DeployError::UnknownEnvironment { source }
    }
}

/// Terminal outcome of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Pending,
    Success,
    Failed,
    #[serde(rename = "rolledback")]
    RolledBack,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Pending => write!(f, "pending"),
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::Failed => write!(f, "failed"),
            AttemptOutcome::RolledBack => write!(f, "rolledback"),
        }
    }
}

/// A failed attempt: the reported error plus whether a rollback restored service.
#[derive(Debug)]
pub struct DeployFailure {
    pub outcome: AttemptOutcome,
    pub error: DeployError,
    /// Version restored by automatic rollback.
    pub restored: Option<VersionId>,
}

impl DeployFailure {
    pub fn failed(error: DeployError) -> Self {
        Self {
            outcome: AttemptOutcome::Failed,
            error,
            restored: None,
        }
    }

    pub fn rolled_back(error: DeployError, restored: VersionId) -> Self {
        Self {
            outcome: AttemptOutcome::RolledBack,
            error,
            restored: Some(restored),
        }
    }
}

impl fmt::Display for DeployFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.restored {
            Some(ref version) => write!(f, "{} (rolled back to {})", self.error, version),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for DeployFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}
