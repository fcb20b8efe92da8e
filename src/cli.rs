// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stevedore::strategy::StrategyKind;

#[derive(Parser)]
#[command(name = "stevedore")]
#[command(about = "Environment-aware deploy and rollback for Docker, Kubernetes and SSH targets")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result (for CI)
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the configuration file (default: discover stevedore.yml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a stevedore.yml in the current directory
    Init {
        /// Project name
        #[arg(long)]
        project: Option<String>,

        /// Dispatch strategy: docker, kubernetes, ssh or generic
        #[arg(long, default_value = "generic")]
        strategy: StrategyKind,

        /// Overwrite an existing stevedore.yml
        #[arg(long)]
        force: bool,
    },

    /// Deploy to an environment
    Deploy {
        /// Target environment (dev, staging, prod, or configured)
        environment: String,

        /// Skip the build step
        #[arg(long)]
        skip_build: bool,

        /// Skip the health check
        #[arg(long)]
        skip_health: bool,

        /// Deploy even if auto-deploy is disabled or the working tree is dirty
        #[arg(long)]
        force: bool,

        /// Validate and print the plan without deploying
        #[arg(long)]
        dry_run: bool,

        /// Version id (default: short git commit, else a UTC timestamp)
        #[arg(long, value_name = "ID")]
        tag: Option<String>,

        /// Approver name; repeat for environments that need several approvals
        #[arg(long = "approve", value_name = "NAME")]
        approvals: Vec<String>,

        /// Do not roll back automatically on failure
        #[arg(long)]
        no_rollback: bool,
    },

    /// Restore a previously deployed version
    Rollback {
        /// Target environment
        environment: String,

        /// Version to restore (default: the one before the current)
        #[arg(long, value_name = "ID")]
        version: Option<String>,

        /// List recorded versions instead of rolling back
        #[arg(long)]
        list: bool,

        /// Print the plan without rolling back
        #[arg(long)]
        dry_run: bool,

        /// Skip the health check after restoring
        #[arg(long)]
        skip_health: bool,
    },

    /// Show the deployed version per environment
    Status {
        /// Limit to one environment
        environment: Option<String>,
    },
}
