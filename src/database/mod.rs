//! Database connection abstraction
//!
//! This module provides the seam between the load engine and the warehouse:
//! - [`Connection`]: executes generated SQL and returns rows
//! - [`quote`]: identifier and literal escaping shared by both sides
//! - [`config`]: validated connection parameters
//! - [`dsn`]: ODBC-style connection strings
//! - [`snowflake`]: a connection over the Snowflake SQL REST API
//!
//! The engine never talks to the network directly; everything goes through a
//! `Connection`, so tests substitute an in-memory double.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod dsn;
pub mod quote;
pub mod snowflake;

pub use config::DatabaseConfig;
pub use snowflake::SnowflakeConnection;

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Query result row as a JSON object keyed by column name
pub type QueryRow = serde_json::Value;

/// Query result set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<QueryRow>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<QueryRow>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Create an empty result
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose `column` equals `value`
    pub fn rows_where<'a>(
        &'a self,
        column: &'a str,
        value: &'a str,
    ) -> impl Iterator<Item = &'a QueryRow> + 'a {
        self.rows
            .iter()
            .filter(move |row| row_str(row, column) == Some(value))
    }
}

/// Read a string cell from a row, `None` for missing or non-string values
pub fn row_str<'a>(row: &'a QueryRow, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|value| value.as_str())
}

/// SQL-executing connection to the warehouse
///
/// Statements run one at a time, in order. Implementations own retries,
/// timeouts and the wire protocol; the engine only issues SQL text.
#[async_trait(?Send)]
pub trait Connection {
    /// Execute a statement that returns no rows
    async fn execute(&self, sql: &str) -> DatabaseResult<()>;

    /// Execute a query and return all rows
    async fn fetch_all(&self, sql: &str) -> DatabaseResult<QueryResult>;

    /// Whether `CREATE TEMPORARY TABLE` survives until the next statement.
    ///
    /// Session-less transports return `false`; staging tables are then
    /// created as regular tables and dropped explicitly.
    fn supports_temporary_tables(&self) -> bool {
        true
    }

    /// Remember the warehouse selected with `USE WAREHOUSE`.
    ///
    /// Session-based connections keep it server-side and ignore this.
    fn use_warehouse(&self, _warehouse: &str) {}

    /// Quote an identifier for this connection
    fn quote_identifier(&self, value: &str) -> String {
        quote::quote_identifier(value)
    }

    /// Quote a string literal for this connection
    fn quote(&self, value: &str) -> String {
        quote::quote_literal(value)
    }
}
