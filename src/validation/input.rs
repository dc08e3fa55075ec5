//! Input validation for load configuration.
//!
//! These checks run while the configuration is turned into validated
//! models, before any SQL is generated.

use thiserror::Error;

/// Maximum length for Snowflake identifiers
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Errors that can occur during input validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Input is empty when a value is required
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Input exceeds maximum allowed length
    #[error("{field} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Input has invalid format
    #[error("{0}: {1}")]
    InvalidFormat(&'static str, String),

    /// Every item is missing or ignored
    #[error("At least one item must be defined and cannot be ignored.")]
    NoActiveItems,

    /// Only one half of a foreign key was given
    #[error("Foreign key of column \"{0}\" needs both a table and a column.")]
    IncompleteForeignKey(String),

    /// Primary key names a column that is not loaded
    #[error("Primary key column \"{0}\" is not defined or is ignored.")]
    UnknownPrimaryKey(String),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a target identifier (table or column name).
///
/// # Examples
///
/// ```
/// use db_writer_snowflake::validation::input::validate_identifier;
///
/// assert!(validate_identifier("dbName", "orders").is_ok());
/// assert!(validate_identifier("dbName", "Order Lines").is_ok());
/// assert!(validate_identifier("dbName", "").is_err());
/// ```
pub fn validate_identifier(field: &'static str, name: &str) -> ValidationResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }

    let length = name.chars().count();
    if length > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_IDENTIFIER_LENGTH,
            actual: length,
        });
    }

    if name.contains('\0') {
        return Err(ValidationError::InvalidFormat(
            field,
            "must not contain NUL characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_length() {
        assert!(validate_identifier("dbName", &"a".repeat(255)).is_ok());
        assert_eq!(
            validate_identifier("dbName", &"a".repeat(256)),
            Err(ValidationError::TooLong {
                field: "dbName",
                max: 255,
                actual: 256
            })
        );
    }

    #[test]
    fn test_identifier_whitespace_only() {
        assert_eq!(
            validate_identifier("dbName", "   "),
            Err(ValidationError::Empty("dbName"))
        );
    }

    #[test]
    fn test_identifier_nul() {
        assert!(matches!(
            validate_identifier("dbName", "a\0b"),
            Err(ValidationError::InvalidFormat("dbName", _))
        ));
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ValidationError::NoActiveItems.to_string(),
            "At least one item must be defined and cannot be ignored."
        );
    }
}
