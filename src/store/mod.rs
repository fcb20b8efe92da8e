// ABOUTME: Per-environment version history with retention and atomic saves.
// ABOUTME: The only component that touches the versions directory on disk.

mod error;
mod lock;
mod snapshot;

pub use error::StoreError;
pub use lock::{HistoryLock, LockInfo};
pub use snapshot::{PayloadRef, Provenance, Snapshot, SnapshotStatus};

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::strategy::StrategyKind;
use crate::types::{EnvironmentName, VersionId};

const METADATA_FILENAME: &str = "metadata.json";
const PAYLOAD_DIRNAME: &str = "payload";
const TEMP_PREFIX: &str = ".tmp-";

/// Default number of snapshots retained per environment.
pub const DEFAULT_KEEP_VERSIONS: usize = 5;

/// Rollback-capable history of deployed snapshots, one directory per
/// environment under `root`:
///
/// ```text
/// <root>/<environment>/<version_id>/metadata.json
/// <root>/<environment>/<version_id>/payload/...
/// ```
///
/// Clones share the per-environment writer locks.
#[derive(Debug, Clone)]
pub struct VersionStore {
    root: PathBuf,
    keep_versions: usize,
    /// Serializes writers per environment inside this process.
    writers: Arc<Mutex<HashMap<EnvironmentName, Arc<Mutex<()>>>>>,
}

impl VersionStore {
    pub fn open(root: impl Into<PathBuf>, keep_versions: usize) -> Self {
        Self {
            root: root.into(),
            keep_versions: keep_versions.max(1),
            writers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keep_versions(&self) -> usize {
        self.keep_versions
    }

    /// Record a successful deployment and prune the history to `keep_versions`.
    ///
    /// The snapshot is assembled in a temporary directory and renamed into
    /// place, so a failed save never leaves a partial snapshot behind.
    /// Saving a version id that already exists replaces it.
    pub fn save(
        &self,
        environment: &EnvironmentName,
        version: &VersionId,
        payload: &PayloadRef,
        strategy: StrategyKind,
        provenance: &Provenance,
    ) -> Result<Snapshot, StoreError> {
        let writer = self.writer(environment);
        let _guard = writer.lock();

        let env_dir = self.env_dir(environment);
        fs::create_dir_all(&env_dir).map_err(|e| StoreError::write(&env_dir, e))?;
        let _lock = HistoryLock::acquire(&env_dir, environment)?;

        let existing = self.read_all(environment)?;
        let mut timestamp = Utc::now();
        if let Some(newest) = existing.iter().map(|s| s.timestamp).max()
            && timestamp <= newest
        {
            timestamp = newest + chrono::Duration::microseconds(1);
        }

        let staging = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(&env_dir)
            .map_err(|e| StoreError::write(&env_dir, e))?;
        let final_dir = env_dir.join(version.as_str());

        let stored_payload = match payload {
            PayloadRef::Directory { path } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| PAYLOAD_DIRNAME.into());
                let staged = staging.path().join(PAYLOAD_DIRNAME);
                let (target, relative) = if path.is_dir() {
                    (staged.clone(), PathBuf::from(PAYLOAD_DIRNAME))
                } else {
                    fs::create_dir_all(&staged).map_err(|e| StoreError::write(&staged, e))?;
                    (staged.join(&name), Path::new(PAYLOAD_DIRNAME).join(&name))
                };
                copy_recursively(path, &target).map_err(|e| StoreError::write(&target, e))?;
                PayloadRef::Directory {
                    path: final_dir.join(relative),
                }
            }
            PayloadRef::Image { .. } => payload.clone(),
        };

        let snapshot = Snapshot {
            version_id: version.clone(),
            timestamp,
            environment: environment.clone(),
            status: SnapshotStatus::Deployed,
            strategy,
            source_commit: provenance.commit.clone(),
            source_branch: provenance.branch.clone(),
            payload: stored_payload,
        };

        let metadata_path = staging.path().join(METADATA_FILENAME);
        let metadata = serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Metadata {
            path: metadata_path.clone(),
            source: e,
        })?;
        fs::write(&metadata_path, metadata).map_err(|e| StoreError::write(&metadata_path, e))?;

        if final_dir.exists() {
            tracing::info!("replacing existing snapshot {} in {}", version, environment);
            let trash = env_dir.join(format!(
                "{}replaced-{}-{}",
                TEMP_PREFIX,
                version,
                timestamp.timestamp_micros()
            ));
            fs::rename(&final_dir, &trash).map_err(|e| StoreError::write(&final_dir, e))?;
            fs::rename(staging.path(), &final_dir).map_err(|e| StoreError::write(&final_dir, e))?;
            if let Err(e) = fs::remove_dir_all(&trash) {
                tracing::warn!("failed to remove replaced snapshot {}: {}", trash.display(), e);
            }
        } else {
            fs::rename(staging.path(), &final_dir).map_err(|e| StoreError::write(&final_dir, e))?;
        }

        tracing::info!(
            environment = %environment,
            version = %version,
            "recorded snapshot"
        );

        self.prune_locked(environment, self.keep_versions)?;
        Ok(snapshot)
    }

    /// Snapshots for an environment, most recent first. An environment without
    /// history yields an empty list.
    pub fn list(&self, environment: &EnvironmentName) -> Result<Vec<Snapshot>, StoreError> {
        self.read_all(environment)
    }

    /// The most recent snapshot (the currently deployed version).
    pub fn latest(&self, environment: &EnvironmentName) -> Result<Snapshot, StoreError> {
        self.read_all(environment)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NoPreviousVersion {
                environment: environment.clone(),
            })
    }

    /// The snapshot before the current one, i.e. the manual rollback target.
    pub fn previous(&self, environment: &EnvironmentName) -> Result<Snapshot, StoreError> {
        self.read_all(environment)?
            .into_iter()
            .nth(1)
            .ok_or_else(|| StoreError::NoPreviousVersion {
                environment: environment.clone(),
            })
    }

    /// Most recent snapshot that is not `failed`, i.e. the last known good
    /// deployment to restore after `failed` could not be brought up.
    pub fn restore_target(
        &self,
        environment: &EnvironmentName,
        failed: &VersionId,
    ) -> Result<Snapshot, StoreError> {
        self.read_all(environment)?
            .into_iter()
            .find(|s| &s.version_id != failed)
            .ok_or_else(|| StoreError::NoPreviousVersion {
                environment: environment.clone(),
            })
    }

    pub fn get(
        &self,
        environment: &EnvironmentName,
        version: &VersionId,
    ) -> Result<Snapshot, StoreError> {
        let dir = self.env_dir(environment).join(version.as_str());
        if !dir.join(METADATA_FILENAME).is_file() {
            return Err(StoreError::VersionNotFound {
                environment: environment.clone(),
                version: version.clone(),
            });
        }
        read_snapshot(&dir)
    }

    /// Keep the `keep_n` most recent snapshots and delete the rest, payloads
    /// included. Returns the evicted version ids.
    pub fn prune(
        &self,
        environment: &EnvironmentName,
        keep_n: usize,
    ) -> Result<Vec<VersionId>, StoreError> {
        let writer = self.writer(environment);
        let _guard = writer.lock();

        let env_dir = self.env_dir(environment);
        if !env_dir.is_dir() {
            return Ok(Vec::new());
        }
        let _lock = HistoryLock::acquire(&env_dir, environment)?;
        self.prune_locked(environment, keep_n)
    }

    /// Flip a snapshot's status to `rolledback` once it has been restored.
    pub fn mark_rolled_back(
        &self,
        environment: &EnvironmentName,
        version: &VersionId,
    ) -> Result<Snapshot, StoreError> {
        let writer = self.writer(environment);
        let _guard = writer.lock();

        let env_dir = self.env_dir(environment);
        if !env_dir.is_dir() {
            return Err(StoreError::VersionNotFound {
                environment: environment.clone(),
                version: version.clone(),
            });
        }
        let _lock = HistoryLock::acquire(&env_dir, environment)?;

        let mut snapshot = self.get(environment, version)?;
        snapshot.status = SnapshotStatus::RolledBack;

        let dir = env_dir.join(version.as_str());
        let metadata_path = dir.join(METADATA_FILENAME);
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Metadata {
            path: metadata_path.clone(),
            source: e,
        })?;
        atomic_write(&dir, &metadata_path, &bytes)?;
        Ok(snapshot)
    }

    /// [`save`](Self::save) on the blocking pool; waiting for another
    /// process's history lock does not hold up the async runtime.
    pub async fn save_async(
        &self,
        environment: &EnvironmentName,
        version: &VersionId,
        payload: &PayloadRef,
        strategy: StrategyKind,
        provenance: &Provenance,
    ) -> Result<Snapshot, StoreError> {
        let store = self.clone();
        let environment = environment.clone();
        let version = version.clone();
        let payload = payload.clone();
        let provenance = provenance.clone();
        off_runtime(move || store.save(&environment, &version, &payload, strategy, &provenance))
            .await
    }

    /// [`mark_rolled_back`](Self::mark_rolled_back) on the blocking pool.
    pub async fn mark_rolled_back_async(
        &self,
        environment: &EnvironmentName,
        version: &VersionId,
    ) -> Result<Snapshot, StoreError> {
        let store = self.clone();
        let environment = environment.clone();
        let version = version.clone();
        off_runtime(move || store.mark_rolled_back(&environment, &version)).await
    }

    fn prune_locked(
        &self,
        environment: &EnvironmentName,
        keep_n: usize,
    ) -> Result<Vec<VersionId>, StoreError> {
        let snapshots = self.read_all(environment)?;
        let env_dir = self.env_dir(environment);
        let mut evicted = Vec::new();

        for snapshot in snapshots.into_iter().skip(keep_n) {
            let dir = env_dir.join(snapshot.version_id.as_str());
            fs::remove_dir_all(&dir).map_err(|e| StoreError::write(&dir, e))?;
            tracing::debug!(environment = %environment, version = %snapshot.version_id, "pruned snapshot");
            evicted.push(snapshot.version_id);
        }

        Ok(evicted)
    }

    fn read_all(&self, environment: &EnvironmentName) -> Result<Vec<Snapshot>, StoreError> {
        let env_dir = self.env_dir(environment);
        let entries = match fs::read_dir(&env_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::read(&env_dir, e)),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::read(&env_dir, e))?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            match read_snapshot(&entry.path()) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => tracing::warn!("skipping unreadable snapshot: {}", e),
            }
        }

        snapshots.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.version_id.cmp(&a.version_id))
        });
        Ok(snapshots)
    }

    fn env_dir(&self, environment: &EnvironmentName) -> PathBuf {
        self.root.join(environment.as_str())
    }

    fn writer(&self, environment: &EnvironmentName) -> Arc<Mutex<()>> {
        self.writers
            .lock()
            .entry(environment.clone())
            .or_default()
            .clone()
    }
}

fn read_snapshot(dir: &Path) -> Result<Snapshot, StoreError> {
    let path = dir.join(METADATA_FILENAME);
    let bytes = fs::read(&path).map_err(|e| StoreError::read(&path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Metadata { path, source: e })
}

/// Write `data` to `path` through a tempfile in `dir`.
async fn off_runtime<T, F>(work: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

fn atomic_write(dir: &Path, path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| StoreError::write(dir, e))?;
    tmp.write_all(data).map_err(|e| StoreError::write(path, e))?;
    tmp.persist(path).map_err(|e| StoreError::write(path, e.error))?;
    Ok(())
}

fn copy_recursively(src: &Path, dst: &Path) -> std::io::Result<()> {
    if fs::metadata(src)?.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_recursively(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        fs::copy(src, dst)?;
    }
    Ok(())
}
