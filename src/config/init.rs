// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a commented stevedore.yml for the chosen strategy.

use std::path::Path;

use crate::error::{Error, Result};
use crate::strategy::StrategyKind;

use super::CONFIG_FILENAME;

pub fn init_config(
    dir: &Path,
    project: Option<&str>,
    strategy: StrategyKind,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let project = project.unwrap_or("my-app");
    if project.trim().is_empty() {
        return Err(Error::InvalidConfig("project cannot be empty".to_string()));
    }

    std::fs::write(&config_path, generate_template_yaml(project, strategy))?;
    Ok(())
}

fn generate_template_yaml(project: &str, strategy: StrategyKind) -> String {
    let target = match strategy {
        StrategyKind::Docker => format!(
            r#"docker:
  image: registry.example.com/{project}
  container: {project}
  # host: ssh://deploy@app.example.com
  run_args: ["-p", "80:3000"]
"#
        ),
        StrategyKind::Kubernetes => format!(
            r#"kubernetes:
  image: registry.example.com/{project}
  deployment: {project}
  namespace: default
"#
        ),
        StrategyKind::Ssh => r#"artifact:
  path: dist
ssh:
  server: deploy@app.example.com
  remote_dir: /srv/app
  # restart_command: sudo systemctl restart app
"#
        .to_string(),
        StrategyKind::Generic => r#"artifact:
  path: dist
"#
        .to_string(),
    };

    format!(
        r#"project: {project}
strategy: {strategy}

{target}
# build:
#   command: ["npm", "run", "build"]

health:
  kind: http
  path: /health
  max_attempts: 30
  interval: 10s

versions:
  keep: 5

environments:
  staging:
    target_url: http://staging.example.com
  prod:
    target_url: http://app.example.com
    required_approvals: 1
"#
    )
}
