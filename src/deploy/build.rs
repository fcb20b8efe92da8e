// ABOUTME: Optional build step that produces the deployable artifact.
// ABOUTME: Runs the configured build command, then checks the artifact exists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::BuildConfig;
use crate::process::{CommandRunner, ExternalCommand, ProcessError};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Command(#[from] ProcessError),

    #[error("artifact not found at {0}")]
    MissingArtifact(PathBuf),
}

/// Run `build.command` from the project directory.
///
/// `env` holds the resolved `build.env` plus `STEVEDORE_*` deployment variables.
pub async fn run_build(
    runner: &dyn CommandRunner,
    build: &BuildConfig,
    project_dir: &Path,
    env: &HashMap<String, String>,
) -> Result<(), BuildError> {
    let Some((program, args)) = build.command.split_first() else {
        return Ok(());
    };

    let mut cmd = ExternalCommand::new(program.as_str())
        .args(args.iter().cloned())
        .current_dir(project_dir)
        .timeout(build.timeout);
    for (key, value) in env {
        cmd = cmd.env(key.as_str(), value.as_str());
    }

    tracing::info!(command = %cmd, "building");
    runner.run(&cmd).await?;
    Ok(())
}

/// The artifact the build is expected to have produced.
pub fn require_artifact(path: &Path) -> Result<(), BuildError> {
    if path.exists() {
        Ok(())
    } else {
        Err(BuildError::MissingArtifact(path.to_path_buf()))
    }
}
