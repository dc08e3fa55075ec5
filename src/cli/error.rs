//! CLI-specific error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::database::DatabaseError;
use crate::writer::WriterError;

/// Exit code for errors the user can fix in the configuration or input
pub const EXIT_USER_ERROR: i32 = 1;

/// Exit code for application failures
pub const EXIT_APPLICATION_ERROR: i32 = 2;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Writer(#[from] WriterError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("IO error: {0}")]
    IoError(String),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => EXIT_USER_ERROR,
            CliError::Writer(e) if e.is_user_error() => EXIT_USER_ERROR,
            CliError::DatabaseError(DatabaseError::ConfigError(_)) => EXIT_USER_ERROR,
            _ => EXIT_APPLICATION_ERROR,
        }
    }
}
