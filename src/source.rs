// ABOUTME: Source-control queries used by deployments: dirty-tree checks and provenance.
// ABOUTME: Git is driven through the command runner; only a missing repository reads as clean.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::process::{CommandRunner, ExternalCommand, ProcessError};
use crate::store::Provenance;

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("git failed: {0}")]
    Git(#[from] ProcessError),

    #[error("git status failed with exit code {code:?}: {stderr}")]
    Status { code: Option<i32>, stderr: String },
}

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Tracked files have uncommitted changes.
    async fn is_dirty(&self) -> Result<bool, SourceError>;

    /// Current commit and branch, when known.
    async fn provenance(&self) -> Provenance;
}

pub struct Git {
    runner: Arc<dyn CommandRunner>,
    dir: PathBuf,
}

impl Git {
    pub fn new(runner: Arc<dyn CommandRunner>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            dir: dir.into(),
        }
    }

    fn git<I, S>(&self, args: I) -> ExternalCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExternalCommand::new("git")
            .args(args)
            // Untranslated messages; `is_dirty` matches on stderr.
            .env("LC_ALL", "C")
            .current_dir(&self.dir)
            .timeout(GIT_TIMEOUT)
    }

    async fn query(&self, args: &[&str]) -> Option<String> {
        let output = self.runner.output(&self.git(args.iter().copied())).await.ok()?;
        let value = output.stdout.trim();
        (output.success() && !value.is_empty()).then(|| value.to_string())
    }
}

#[async_trait]
impl SourceControl for Git {
    async fn is_dirty(&self) -> Result<bool, SourceError> {
        let output = self
            .runner
            .output(&self.git(["status", "--porcelain", "--untracked-files=no"]))
            .await;

        match output {
            Ok(output) if output.success() => Ok(!output.stdout.trim().is_empty()),
            Ok(output) if output.stderr.contains("not a git repository") => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    "not a git repository, skipping dirty-tree check"
                );
                Ok(false)
            }
            Ok(output) => Err(SourceError::Status {
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }),
            Err(ProcessError::Spawn { .. }) => {
                tracing::warn!("git is not installed, skipping dirty-tree check");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn provenance(&self) -> Provenance {
        Provenance {
            commit: self.query(&["rev-parse", "--short", "HEAD"]).await,
            branch: self
                .query(&["rev-parse", "--abbrev-ref", "HEAD"])
                .await
                .filter(|b| b != "HEAD"),
        }
    }
}
