// ABOUTME: Cross-process lock file guarding one environment's version history.
// ABOUTME: Atomic create-new of .lock with holder info; stale locks are broken after an hour.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::types::EnvironmentName;

use super::StoreError;

const LOCK_FILENAME: &str = ".lock";

/// How long to wait for another process to release the lock.
const LOCK_WAIT: Duration = Duration::from_secs(30);
const LOCK_POLL: Duration = Duration::from_millis(50);

/// Information about who holds a history lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    pub environment: String,
}

impl LockInfo {
    pub fn new(environment: &EnvironmentName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            environment: environment.to_string(),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }
}

/// A held history lock; the lock file is removed on drop.
#[derive(Debug)]
pub struct HistoryLock {
    path: PathBuf,
}

impl HistoryLock {
    /// Acquire the lock for an environment directory, waiting for other
    /// processes up to a bounded time.
    pub fn acquire(env_dir: &Path, environment: &EnvironmentName) -> Result<Self, StoreError> {
        let path = env_dir.join(LOCK_FILENAME);
        let info = LockInfo::new(environment);
        let payload = serde_json::to_vec(&info).map_err(|e| StoreError::Metadata {
            path: path.clone(),
            source: e,
        })?;
        let deadline = Instant::now() + LOCK_WAIT;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&payload)
                        .map_err(|e| StoreError::write(&path, e))?;
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(StoreError::write(&path, e)),
            }

            let existing = std::fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<LockInfo>(&bytes).ok());

            match existing {
                Some(holder) if !holder.is_stale() => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Locked {
                            environment: environment.clone(),
                            holder: holder.holder,
                            pid: holder.pid,
                            since: holder.started_at,
                        });
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Some(holder) => {
                    tracing::warn!(
                        "Auto-breaking stale history lock held by {} (pid {}) since {}",
                        holder.holder,
                        holder.pid,
                        holder.started_at
                    );
                    let _ = std::fs::remove_file(&path);
                }
                None => {
                    // The holder may be between create and write; give it a
                    // moment before treating the file as corrupted.
                    std::thread::sleep(LOCK_POLL);
                    let still_unreadable = std::fs::read(&path)
                        .ok()
                        .and_then(|bytes| serde_json::from_slice::<LockInfo>(&bytes).ok())
                        .is_none();
                    if still_unreadable && path.exists() {
                        tracing::warn!("History lock at {} is corrupted, breaking it", path.display());
                        let _ = std::fs::remove_file(&path);
                    }
                }
            }
        }
    }
}

impl Drop for HistoryLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("failed to release history lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> EnvironmentName {
        EnvironmentName::new("dev").unwrap()
    }

    #[test]
    fn lock_info_records_current_process() {
        let info = LockInfo::new(&env());
        assert_eq!(info.environment, "dev");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
        assert!(!info.is_stale());
    }

    #[test]
    fn old_lock_is_stale() {
        let mut info = LockInfo::new(&env());
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale());
    }

    #[test]
    fn lock_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = HistoryLock::acquire(dir.path(), &env()).unwrap();
            assert!(dir.path().join(LOCK_FILENAME).exists());
        }
        assert!(!dir.path().join(LOCK_FILENAME).exists());
    }

    #[test]
    fn stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let mut stale = LockInfo::new(&env());
        stale.started_at = Utc::now() - chrono::Duration::hours(3);
        stale.pid = 1;
        std::fs::write(
            dir.path().join(LOCK_FILENAME),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();

        let lock = HistoryLock::acquire(dir.path(), &env());
        assert!(lock.is_ok());
    }

    #[test]
    fn corrupted_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILENAME), b"not json").unwrap();

        assert!(HistoryLock::acquire(dir.path(), &env()).is_ok());
    }
}
