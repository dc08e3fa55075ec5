//! Validation module
//!
//! Free validation functions applied while raw configuration is turned into
//! the validated models in [`crate::models`].

pub mod input;
pub mod tables;

pub use input::{ValidationError, ValidationResult, validate_identifier};
pub use tables::{validate_items, validate_primary_key};
