// ABOUTME: Deploy command implementation.
// ABOUTME: Resolves the version and payload, runs hooks and the build, then the orchestrator.

use chrono::Utc;
use std::collections::HashMap;

use super::Workspace;
use stevedore::config::{Config, resolve_env_map};
use stevedore::deploy::{DeployError, DeployPlan, DeployRequest, require_artifact, run_build};
use stevedore::diagnostics::{Diagnostics, Warning};
use stevedore::error::{Error, Result};
use stevedore::health::CancelSignal;
use stevedore::hooks::{HookContext, HookPoint, HookRunner};
use stevedore::output::Output;
use stevedore::source::SourceControl;
use stevedore::store::PayloadRef;
use stevedore::strategy::StrategyKind;
use stevedore::types::{EnvironmentName, VersionId};

pub struct DeployArgs {
    pub environment: String,
    pub skip_build: bool,
    pub skip_health: bool,
    pub force: bool,
    pub dry_run: bool,
    pub tag: Option<String>,
    pub approvals: Vec<String>,
    pub no_rollback: bool,
}

pub async fn deploy(
    ws: &Workspace,
    args: DeployArgs,
    mut output: Output,
    cancel: CancelSignal,
) -> Result<()> {
    output.start_timer();
    let config = &ws.config;
    let mut diag = Diagnostics::default();

    let version = resolve_version(args.tag.as_deref(), &ws.source).await?;
    let payload = payload_for(config, &version)?;
    let request = DeployRequest {
        environment: args.environment.clone(),
        version: version.clone(),
        strategy: config.strategy,
        payload: payload.clone(),
        force: args.force,
        skip_health: args.skip_health,
        approvals: args.approvals.clone(),
        rollback: !args.no_rollback,
    };
    let orchestrator = ws.orchestrator();

    // Validation runs before the build so a rejected deployment has no side effects.
    let plan = match orchestrator.plan(&request).await {
        Ok(plan) => plan,
        Err(failure) if args.dry_run => return Err(failure.into()),
        Err(failure) => return Err(orchestrator.fail(&request, failure).await.into()),
    };
    if args.dry_run {
        print_plan(&output, &plan, config, args.skip_build);
        return Ok(());
    }

    let policy = orchestrator.policies().resolve(&args.environment).map_err(DeployError::from)?;
    if args.force && !policy.auto_deploy_allowed {
        diag.warn(Warning::forced(format!(
            "automatic deployment to {} is disabled; continuing because of --force",
            policy.name
        )));
    }

    output.progress(&format!(
        "Deploying {} {} to {} ({})",
        config.project, version, policy.name, config.strategy
    ));

    let hooks = HookRunner::new(&config.base_dir);
    let mut hook_context = HookContext {
        project: config.project.clone(),
        environment: policy.name.clone(),
        version: version.clone(),
        strategy: config.strategy,
        previous_version: ws.store.latest(&policy.name).ok().map(|s| s.version_id),
        error: None,
    };

    if let Some(result) = hooks
        .run(ws.runner.as_ref(), HookPoint::PreDeploy, &hook_context)
        .await
        && !result.success
    {
        if !result.stderr.is_empty() {
            eprintln!("{}", result.stderr.trim_end());
        }
        return Err(Error::Hook(HookPoint::PreDeploy.filename().to_string()));
    }

    if let Err(e) = build(ws, &args, &policy.name, &version, &payload).await {
        hook_context.error = Some(e.to_string());
        run_warning_hook(ws, &hooks, HookPoint::OnError, &hook_context, &mut diag).await;
        diag.print(&output);
        return Err(match e {
            Error::Deploy(failure) => orchestrator.fail(&request, failure).await.into(),
            other => other,
        });
    }

    output.progress(&format!("  → Dispatching via {}...", config.strategy));
    if plan.health_check.is_some() {
        output.progress("  → Health check will follow dispatch");
    }

    match orchestrator.deploy(&request, &cancel).await {
        Ok(report) => {
            run_warning_hook(ws, &hooks, HookPoint::PostDeploy, &hook_context, &mut diag).await;
            diag.finish(
                &output,
                &report,
                &format!("  ✓ {} is live on {}", version, policy.name),
            );
            output.success("Deployment complete!");
            Ok(())
        }
        Err(failure) => {
            hook_context.error = Some(failure.to_string());
            run_warning_hook(ws, &hooks, HookPoint::OnError, &hook_context, &mut diag).await;
            diag.print(&output);
            Err(failure.into())
        }
    }
}

async fn build(
    ws: &Workspace,
    args: &DeployArgs,
    environment: &EnvironmentName,
    version: &VersionId,
    payload: &PayloadRef,
) -> Result<()> {
    let config = &ws.config;

    if let Some(ref build) = config.build
        && !args.skip_build
    {
        let mut env: HashMap<String, String> = resolve_env_map(&build.env)?;
        env.insert("STEVEDORE_ENVIRONMENT".to_string(), environment.to_string());
        env.insert("STEVEDORE_VERSION".to_string(), version.to_string());
        if let PayloadRef::Image { ref reference } = *payload {
            env.insert("STEVEDORE_IMAGE".to_string(), reference.clone());
        }
        run_build(ws.runner.as_ref(), build, &config.base_dir, &env)
            .await
            .map_err(|source| DeployError::Build { source })?;
    }

    if let PayloadRef::Directory { ref path } = *payload {
        require_artifact(path).map_err(|source| DeployError::Build { source })?;
    }
    Ok(())
}

async fn run_warning_hook(
    ws: &Workspace,
    hooks: &HookRunner,
    point: HookPoint,
    context: &HookContext,
    diag: &mut Diagnostics,
) {
    if let Some(result) = hooks.run(ws.runner.as_ref(), point, context).await
        && !result.success
    {
        diag.warn(Warning::hook(format!(
            "{} hook failed with exit code {:?}",
            point.filename(),
            result.exit_code
        )));
    }
}

/// `--tag`, else the short commit, else a UTC timestamp.
async fn resolve_version(tag: Option<&str>, source: &dyn SourceControl) -> Result<VersionId> {
    if let Some(tag) = tag {
        return VersionId::new(tag).map_err(|e| Error::InvalidArgument(format!("--tag: {e}")));
    }
    if let Some(commit) = source.provenance().await.commit
        && let Ok(version) = VersionId::new(&commit)
    {
        return Ok(version);
    }
    Ok(VersionId::from_timestamp(Utc::now()))
}

fn payload_for(config: &Config, version: &VersionId) -> Result<PayloadRef> {
    let image = match config.strategy {
        StrategyKind::Docker => config.docker.as_ref().map(|d| &d.image),
        StrategyKind::Kubernetes => config.kubernetes.as_ref().map(|k| &k.image),
        StrategyKind::Ssh | StrategyKind::Generic => None,
    };
    if let Some(image) = image {
        return Ok(PayloadRef::Image {
            reference: image.for_version(version).to_string(),
        });
    }

    config
        .artifact_path()
        .map(|path| PayloadRef::Directory { path })
        .ok_or_else(|| {
            Error::InvalidConfig(format!(
                "strategy '{}' needs artifact.path",
                config.strategy
            ))
        })
}

fn print_plan(output: &Output, plan: &DeployPlan, config: &Config, skip_build: bool) {
    let mut lines = vec![format!(
        "Dry run: {} {} to {} ({})",
        config.project, plan.version, plan.environment, plan.strategy
    )];
    if let Some(ref build) = config.build
        && !skip_build
    {
        lines.push(format!("  build:    {}", build.command.join(" ")));
    }
    lines.push(format!("  payload:  {}", plan.payload));
    if plan.commands.is_empty() {
        lines.push("  dispatch: none (artifacts are ready)".to_string());
    }
    for command in &plan.commands {
        lines.push(format!("  dispatch: {command}"));
    }
    match plan.health_check {
        Some(ref target) => lines.push(format!("  health:   {target}")),
        None => lines.push("  health:   skipped".to_string()),
    }
    for version in &plan.evicts {
        lines.push(format!("  prune:    {version}"));
    }
    output.result(plan, &lines.join("\n"));
}
