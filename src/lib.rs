//! Snowflake DB writer - loads storage-exported CSV tables into Snowflake
//!
//! Provides:
//! - Configuration loading and validation (`config.json`, table manifests)
//! - SQL generation for table DDL, staging, copy and upsert
//! - S3 and Azure Blob Storage staging strategies
//! - Load orchestration with full-load swap and incremental upsert
//! - A Snowflake SQL API connection and ODBC connection strings

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod database;
pub mod logging;
pub mod models;
pub mod validation;
pub mod writer;

// Re-export commonly used types
pub use config::{Action, AppConfig, ConfigError, InputTable};
pub use database::{
    Connection, DatabaseConfig, DatabaseError, DatabaseResult, QueryResult, SnowflakeConnection,
};
pub use models::{Column, ForeignKey, StagingManifest, TableLoadSpec, TableManifest};
pub use validation::ValidationError;
pub use writer::{
    LoadReport, LoadState, LoadStatus, QueryBuilder, WriteAdapter, Writer, WriterError,
    WriterResult,
};
