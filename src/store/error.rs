// ABOUTME: Error types for version history storage.
// ABOUTME: Distinguishes write failures from lookups that find no matching snapshot.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::types::{EnvironmentName, VersionId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The environment directory or snapshot could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot metadata in {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Rollback needs a snapshot before the current one.
    #[error("no previous version recorded for {environment}")]
    NoPreviousVersion { environment: EnvironmentName },

    #[error("version {version} not found in {environment} history")]
    VersionNotFound {
        environment: EnvironmentName,
        version: VersionId,
    },

    #[error("version history for {environment} is locked by {holder} (pid {pid}) since {since}")]
    Locked {
        environment: EnvironmentName,
        holder: String,
        pid: u32,
        since: DateTime<Utc>,
    },

    #[error("version history task did not complete: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Write {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Read {
            path: path.into(),
            source,
        }
    }
}
