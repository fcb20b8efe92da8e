// ABOUTME: Hooks system for deployment lifecycle events.
// ABOUTME: Discovers and executes project scripts at pre-deploy, post-deploy, and on-error points.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::{CommandRunner, ExternalCommand};
use crate::strategy::StrategyKind;
use crate::types::{EnvironmentName, VersionId};

const HOOK_TIMEOUT: Duration = Duration::from_secs(300);

/// Hook execution points in the deployment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before dispatch. Failure aborts the deployment.
    PreDeploy,
    /// After a successful deployment. Failure logs a warning.
    PostDeploy,
    /// After a failed deployment. Failure logs a warning.
    OnError,
}

impl HookPoint {
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::PreDeploy => "pre-deploy",
            HookPoint::PostDeploy => "post-deploy",
            HookPoint::OnError => "on-error",
        }
    }

    /// Whether failure at this hook point should abort deployment.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HookPoint::PreDeploy)
    }
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub project: String,
    pub environment: EnvironmentName,
    pub version: VersionId,
    pub strategy: StrategyKind,
    pub previous_version: Option<VersionId>,
    /// Set for `on-error`.
    pub error: Option<String>,
}

impl HookContext {
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("STEVEDORE_PROJECT".to_string(), self.project.clone());
        env.insert(
            "STEVEDORE_ENVIRONMENT".to_string(),
            self.environment.to_string(),
        );
        env.insert("STEVEDORE_VERSION".to_string(), self.version.to_string());
        env.insert("STEVEDORE_STRATEGY".to_string(), self.strategy.to_string());
        if let Some(ref prev) = self.previous_version {
            env.insert("STEVEDORE_PREVIOUS_VERSION".to_string(), prev.to_string());
        }
        if let Some(ref error) = self.error {
            env.insert("STEVEDORE_ERROR".to_string(), error.clone());
        }
        env
    }
}

/// Result of running a hook.
#[derive(Debug)]
pub struct HookResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Discovers and runs hooks from `.stevedore/hooks` in the project directory.
pub struct HookRunner {
    hooks_dir: PathBuf,
}

impl HookRunner {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            hooks_dir: project_dir.join(".stevedore").join("hooks"),
        }
    }

    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.hook_path(point).is_file()
    }

    fn hook_path(&self, point: HookPoint) -> PathBuf {
        self.hooks_dir.join(point.filename())
    }

    /// Run a hook if it exists.
    ///
    /// Returns None if the hook doesn't exist, or Some(HookResult) if it was run.
    pub async fn run(
        &self,
        runner: &dyn CommandRunner,
        point: HookPoint,
        context: &HookContext,
    ) -> Option<HookResult> {
        let hook_path = self.hook_path(point);

        if !hook_path.is_file() {
            return None;
        }

        tracing::info!("Running {} hook: {}", point.filename(), hook_path.display());

        let mut cmd = ExternalCommand::new(hook_path.display().to_string()).timeout(HOOK_TIMEOUT);
        if let Some(project_dir) = self.hooks_dir.parent().and_then(Path::parent) {
            cmd = cmd.current_dir(project_dir);
        }
        for (key, value) in context.to_env() {
            cmd = cmd.env(key, value);
        }

        match runner.output(&cmd).await {
            Ok(output) => {
                let result = HookResult {
                    success: output.success(),
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                };

                if result.success {
                    tracing::info!("{} hook completed successfully", point.filename());
                } else {
                    tracing::warn!(
                        "{} hook failed with exit code {:?}",
                        point.filename(),
                        result.exit_code
                    );
                }

                Some(result)
            }
            Err(e) => {
                tracing::error!("Failed to execute {} hook: {}", point.filename(), e);
                Some(HookResult {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                })
            }
        }
    }
}
