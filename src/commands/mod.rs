// ABOUTME: Command module aggregator for the stevedore CLI.
// ABOUTME: Re-exports deploy, rollback, and status command handlers.

mod deploy;
mod rollback;
mod status;
mod workspace;

pub use deploy::{DeployArgs, deploy};
pub use rollback::{RollbackArgs, rollback};
pub use status::status;
pub use workspace::Workspace;
