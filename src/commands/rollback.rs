// ABOUTME: Rollback command implementation.
// ABOUTME: Lists recorded versions, previews a rollback, or restores a snapshot.

use super::Workspace;
use stevedore::deploy::{DeployError, RollbackRequest};
use stevedore::error::{Error, Result};
use stevedore::health::CancelSignal;
use stevedore::output::Output;
use stevedore::store::Snapshot;
use stevedore::types::VersionId;

pub struct RollbackArgs {
    pub environment: String,
    pub version: Option<String>,
    pub list: bool,
    pub dry_run: bool,
    pub skip_health: bool,
}

pub async fn rollback(
    ws: &Workspace,
    args: RollbackArgs,
    mut output: Output,
    cancel: CancelSignal,
) -> Result<()> {
    output.start_timer();
    let orchestrator = ws.orchestrator();

    if args.list {
        let policy = orchestrator
            .policies()
            .resolve(&args.environment)
            .map_err(DeployError::from)?;
        let versions = ws.store.list(&policy.name)?;
        output.result(&versions, &format_versions(&policy.name.to_string(), &versions));
        return Ok(());
    }

    let version = args
        .version
        .as_deref()
        .map(VersionId::new)
        .transpose()
        .map_err(|e| Error::InvalidArgument(format!("--version: {e}")))?;
    let request = RollbackRequest {
        environment: args.environment,
        version,
        skip_health: args.skip_health,
    };

    if args.dry_run {
        let plan = orchestrator.rollback_plan(&request)?;
        let mut lines = vec![format!(
            "Dry run: restore {} on {} ({})",
            plan.target.version_id, plan.environment, plan.target.strategy
        )];
        lines.push(format!("  payload:  {}", plan.target.payload));
        for command in &plan.commands {
            lines.push(format!("  dispatch: {command}"));
        }
        match plan.health_check {
            Some(ref target) => lines.push(format!("  health:   {target}")),
            None => lines.push("  health:   skipped".to_string()),
        }
        output.result(&plan, &lines.join("\n"));
        return Ok(());
    }

    output.progress(&format!("Rolling back {}...", request.environment));
    let report = orchestrator.rollback(&request, &cancel).await?;
    output.result(
        &report,
        &format!(
            "  ✓ {} restored on {}",
            report.snapshot.version_id, report.snapshot.environment
        ),
    );
    output.success("Rollback complete!");
    Ok(())
}

fn format_versions(environment: &str, versions: &[Snapshot]) -> String {
    if versions.is_empty() {
        return format!("No versions recorded for {environment}");
    }
    let mut lines = vec![format!("Versions for {environment} (newest first):")];
    for (i, snapshot) in versions.iter().enumerate() {
        let marker = if i == 0 { "*" } else { " " };
        lines.push(format!(
            "{marker} {:<24} {}  {:<10} {}",
            snapshot.version_id.as_str(),
            snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            snapshot.status.to_string(),
            snapshot.strategy
        ));
    }
    lines.join("\n")
}
