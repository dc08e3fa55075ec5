//! CLI command implementations

pub mod run;

pub use run::{RunArgs, handle_run, handle_test_connection};
