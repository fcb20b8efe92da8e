// ABOUTME: Status command implementation.
// ABOUTME: Shows the most recent recorded version for each environment.

use serde::Serialize;

use super::Workspace;
use stevedore::deploy::DeployError;
use stevedore::error::Result;
use stevedore::output::Output;
use stevedore::store::Snapshot;
use stevedore::types::EnvironmentName;

#[derive(Debug, Serialize)]
struct EnvironmentStatus {
    environment: EnvironmentName,
    current: Option<Snapshot>,
    versions: usize,
}

pub fn status(ws: &Workspace, environment: Option<&str>, output: Output) -> Result<()> {
    let orchestrator = ws.orchestrator();
    let policies = orchestrator.policies();

    let names: Vec<EnvironmentName> = match environment {
        Some(name) => vec![policies.resolve(name).map_err(DeployError::from)?.name],
        None => policies.names().cloned().collect(),
    };

    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let versions = ws.store.list(&name)?;
        rows.push(EnvironmentStatus {
            environment: name,
            current: versions.first().cloned(),
            versions: versions.len(),
        });
    }

    let mut lines = vec![format!("Project: {} ({})", ws.config.project, ws.config.strategy)];
    for row in &rows {
        match row.current {
            Some(ref snapshot) => lines.push(format!(
                "  {:<12} {:<24} {}  {} ({} recorded)",
                row.environment.as_str(),
                snapshot.version_id.as_str(),
                snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                snapshot.status,
                row.versions
            )),
            None => lines.push(format!("  {:<12} never deployed", row.environment.as_str())),
        }
    }
    output.result(&rows, &lines.join("\n"));
    Ok(())
}
