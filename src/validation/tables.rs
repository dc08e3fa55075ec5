//! Table-level validation
//!
//! Checks that span several columns of one load: at least one column is
//! materialized, and the primary key only names materialized columns.

use crate::models::Column;
use crate::validation::input::{ValidationError, ValidationResult};

/// Require at least one column that is not ignored
///
/// # Example
///
/// ```rust
/// use db_writer_snowflake::models::Column;
/// use db_writer_snowflake::validation::tables::validate_items;
///
/// assert!(validate_items(&[Column::new("id", "id", "int")]).is_ok());
/// assert!(validate_items(&[Column::new("x", "x", "ignore")]).is_err());
/// ```
pub fn validate_items(items: &[Column]) -> ValidationResult<()> {
    if items.iter().all(Column::is_ignored) {
        return Err(ValidationError::NoActiveItems);
    }
    Ok(())
}

/// Require every primary key name to match a non-ignored column's `db_name`
pub fn validate_primary_key(items: &[Column], primary_key: &[String]) -> ValidationResult<()> {
    for key in primary_key {
        let known = items
            .iter()
            .any(|item| !item.is_ignored() && item.db_name == *key);
        if !known {
            return Err(ValidationError::UnknownPrimaryKey(key.clone()));
        }
    }
    Ok(())
}
