//! Command-line front end
//!
//! The binary reads `config.json` from the data directory and performs its
//! `action`: `run` loads every configured table, `testConnection` checks the
//! credentials.

pub mod commands;
pub mod error;

pub use error::CliError;
