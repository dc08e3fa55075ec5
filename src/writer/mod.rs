//! Table load engine
//!
//! - [`query_builder`]: SQL text for every statement the engine issues
//! - [`strategy`]: external stage and `COPY INTO` commands per storage provider
//! - [`storage`]: object stores used to read sliced-file manifests
//! - [`adapter`]: table-level operations (create, load, swap, upsert, keys)
//! - [`snowflake`]: the orchestrator driving one or more table loads

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ConfigError;
use crate::database::DatabaseError;

pub mod adapter;
pub mod query_builder;
pub mod snowflake;
pub mod storage;
pub mod strategy;

pub use adapter::WriteAdapter;
pub use query_builder::QueryBuilder;
pub use snowflake::{BatchOutcome, LoadReport, LoadState, LoadStatus, Writer};

/// Error type for table loads
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// Invalid configuration: fix the config, retrying will not help
    #[error("{0}")]
    Configuration(String),

    /// Input data or its manifest could not be read
    #[error("{0}")]
    DataSource(String),

    /// Statement failed in the warehouse
    #[error(transparent)]
    Execution(#[from] DatabaseError),
}

impl WriterError {
    /// Whether the error is the user's to fix (exit code 1) rather than an
    /// application failure (exit code 2)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            WriterError::Configuration(_) | WriterError::DataSource(_)
        )
    }
}

impl From<ConfigError> for WriterError {
    fn from(error: ConfigError) -> Self {
        WriterError::Configuration(error.to_string())
    }
}

/// Result type for table loads
pub type WriterResult<T> = Result<T, WriterError>;

static OBJECT_DOES_NOT_EXIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Object does not exist").expect("Invalid regex"));

/// Whether a warehouse error says the referenced object is missing
pub fn is_missing_object(error: &DatabaseError) -> bool {
    OBJECT_DOES_NOT_EXIST.is_match(&error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors() {
        assert!(WriterError::Configuration("x".into()).is_user_error());
        assert!(WriterError::DataSource("x".into()).is_user_error());
        assert!(!WriterError::Execution(DatabaseError::QueryFailed("x".into())).is_user_error());
    }

    #[test]
    fn test_config_error_becomes_configuration() {
        let error: WriterError = ConfigError::UnknownInputTable("in.c-main.t".into()).into();
        assert!(error.is_user_error());
        assert_eq!(
            error.to_string(),
            "Table \"in.c-main.t\" in storage input mapping cannot be found."
        );
    }

    #[test]
    fn test_missing_object_is_case_insensitive() {
        let error = DatabaseError::QueryFailed(
            "SQL compilation error: OBJECT DOES NOT EXIST, or operation cannot be performed."
                .to_string(),
        );
        assert!(is_missing_object(&error));
        assert!(!is_missing_object(&DatabaseError::QueryFailed("timeout".into())));
    }
}
