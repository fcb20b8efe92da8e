// ABOUTME: Application-wide error types for stevedore.
// ABOUTME: Wraps config, storage and deployment failures and maps them to exit codes.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::{DeployError, DeployErrorKind, DeployFailure};
use crate::store::StoreError;

/// Process exit codes, one per failure category.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const CONFIG: i32 = 1;
    pub const VALIDATION: i32 = 2;
    pub const BUILD: i32 = 3;
    pub const DISPATCH: i32 = 4;
    pub const HEALTH: i32 = 5;
    pub const ROLLBACK: i32 = 6;
    pub const STORAGE: i32 = 7;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} hook failed")]
    Hook(String),

    #[error(transparent)]
    Deploy(#[from] DeployFailure),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<DeployError> for Error {
    fn from(err: DeployError) -> Self {
        Error::Deploy(DeployFailure::failed(err))
    }
}

impl Error {
    /// Exit code that lets calling pipelines branch on the failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Deploy(failure) => match failure.error.kind() {
                DeployErrorKind::Validation => exit_code::VALIDATION,
                DeployErrorKind::Build => exit_code::BUILD,
                DeployErrorKind::Dispatch => exit_code::DISPATCH,
                DeployErrorKind::Health => exit_code::HEALTH,
                DeployErrorKind::Rollback => exit_code::ROLLBACK,
                DeployErrorKind::Storage => exit_code::STORAGE,
            },
            Error::Store(_) => exit_code::STORAGE,
            _ => exit_code::CONFIG,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
