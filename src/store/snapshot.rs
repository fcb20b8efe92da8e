// ABOUTME: Artifact snapshot records kept in the version history.
// ABOUTME: One snapshot per successful deployment, serialized as metadata.json.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::strategy::StrategyKind;
use crate::types::{EnvironmentName, VersionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Deployed,
    #[serde(rename = "rolledback")]
    RolledBack,
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotStatus::Deployed => write!(f, "deployed"),
            SnapshotStatus::RolledBack => write!(f, "rolledback"),
        }
    }
}

/// Reference to the deployable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PayloadRef {
    /// A local directory (or file) that is synced to the target.
    Directory { path: PathBuf },
    /// A registry image reference.
    Image { reference: String },
}

impl fmt::Display for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadRef::Directory { path } => write!(f, "{}", path.display()),
            PayloadRef::Image { reference } => write!(f, "{}", reference),
        }
    }
}

/// Where a deployed artifact came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub commit: Option<String>,
    pub branch: Option<String>,
}

/// A recorded, restorable deployment state for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version_id: VersionId,
    pub timestamp: DateTime<Utc>,
    pub environment: EnvironmentName,
    pub status: SnapshotStatus,
    /// Strategy the snapshot was deployed with; restores use the same one.
    pub strategy: StrategyKind,
    #[serde(default)]
    pub source_commit: Option<String>,
    #[serde(default)]
    pub source_branch: Option<String>,
    pub payload: PayloadRef,
}
