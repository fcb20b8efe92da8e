// ABOUTME: Entry point for the stevedore CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{DeployArgs, RollbackArgs, Workspace};
use std::env;
use stevedore::config;
use stevedore::error::Result;
use stevedore::health::{CancelSignal, cancel_pair};
use stevedore::output::{Output, OutputMode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --verbose wins over RUST_LOG
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    if let Err(e) = run(cli, mode).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let output = Output::new(mode);

    match cli.command {
        Commands::Init {
            project,
            strategy,
            force,
        } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, project.as_deref(), strategy, force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Deploy {
            environment,
            skip_build,
            skip_health,
            force,
            dry_run,
            tag,
            approvals,
            no_rollback,
        } => {
            let ws = Workspace::load(cli.config.as_deref())?;
            let args = DeployArgs {
                environment,
                skip_build,
                skip_health,
                force,
                dry_run,
                tag,
                approvals,
                no_rollback,
            };
            commands::deploy(&ws, args, output, interruptible()).await
        }
        Commands::Rollback {
            environment,
            version,
            list,
            dry_run,
            skip_health,
        } => {
            let ws = Workspace::load(cli.config.as_deref())?;
            let args = RollbackArgs {
                environment,
                version,
                list,
                dry_run,
                skip_health,
            };
            commands::rollback(&ws, args, output, interruptible()).await
        }
        Commands::Status { environment } => {
            let ws = Workspace::load(cli.config.as_deref())?;
            commands::status(&ws, environment.as_deref(), output)
        }
    }
}

/// Ctrl-C stops the health check at its next boundary.
fn interruptible() -> CancelSignal {
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; stopping at the next health check boundary");
            handle.cancel();
        }
    });
    signal
}
