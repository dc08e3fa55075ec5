//! Component configuration
//!
//! The storage platform hands the writer a data directory containing
//! `config.json`, the input tables under `in/tables/` and a `.manifest`
//! beside every table file. This module turns `config.json` into validated
//! models.
//!
//! Two layouts are accepted:
//! - multi-table: `parameters.tables[]`, foreign keys are created after all
//!   tables load
//! - config row: the table entry is inlined in `parameters`

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::database::DatabaseConfig;
use crate::models::{RawTableConfig, TableLoadSpec};
use crate::validation::ValidationError;

/// Name of the configuration file in the data directory
pub const CONFIG_FILE: &str = "config.json";

/// Environment variable carrying the data directory
pub const ENV_DATA_DIR: &str = "KBC_DATADIR";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(String),

    /// Config file is not valid JSON or has the wrong shape
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Required value missing or empty
    #[error("Missing required configuration value: {0}")]
    MissingField(String),

    /// Field-level validation failed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Table id not present in the storage input mapping
    #[error("Table \"{0}\" in storage input mapping cannot be found.")]
    UnknownInputTable(String),

    /// Sidecar manifest unreadable or malformed
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Unsupported `action`
    #[error("Action \"{0}\" is not supported.")]
    UnknownAction(String),
}

/// Entry of `storage.input.tables[]`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InputTable {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawInput {
    #[serde(default)]
    tables: Vec<InputTable>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStorage {
    #[serde(default)]
    input: RawInput,
}

#[derive(Debug, Deserialize)]
struct RawAppConfig {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    parameters: serde_json::Value,
    #[serde(default)]
    storage: RawStorage,
}

/// What the component was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Load the configured tables
    #[default]
    Run,
    /// Only check that the connection works
    TestConnection,
}

impl Action {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "run" => Ok(Action::Run),
            "testConnection" => Ok(Action::TestConnection),
            other => Err(ConfigError::UnknownAction(other.to_string())),
        }
    }
}

/// Validated component configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub action: Action,
    pub data_dir: PathBuf,
    pub db: DatabaseConfig,
    /// Tables in declaration order
    pub tables: Vec<TableLoadSpec>,
    /// `parameters.tables[]` layout; enables the foreign key pass
    pub multi_table: bool,
}

impl AppConfig {
    /// Load `<data_dir>/config.json`
    pub async fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Io(format!("cannot read {}: {}", path.display(), e)))?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::from_raw(&value, data_dir)
    }

    /// Validate an already parsed `config.json`
    pub fn from_raw(value: &serde_json::Value, data_dir: &Path) -> Result<Self, ConfigError> {
        let raw: RawAppConfig = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let action = match raw.action.as_deref() {
            None | Some("") => Action::Run,
            Some(action) => Action::parse(action)?,
        };

        let db_node = raw
            .parameters
            .get("db")
            .ok_or_else(|| ConfigError::MissingField("parameters.db".to_string()))?;
        let mut db = DatabaseConfig::from_raw(db_node)?;
        db.apply_env_overrides();

        let multi_table = raw.parameters.get("tables").is_some();
        let mut tables = Vec::new();

        if action == Action::Run {
            let raw_tables: Vec<RawTableConfig> = if multi_table {
                serde_json::from_value(raw.parameters["tables"].clone())
                    .map_err(|e| ConfigError::Invalid(format!("parameters.tables: {}", e)))?
            } else {
                vec![
                    serde_json::from_value(raw.parameters.clone())
                        .map_err(|e| ConfigError::Invalid(format!("parameters: {}", e)))?,
                ]
            };

            for raw_table in raw_tables {
                tables.push(TableLoadSpec::from_raw(
                    raw_table,
                    &raw.storage.input.tables,
                    data_dir,
                )?);
            }
        }

        Ok(Self {
            action,
            data_dir: data_dir.to_path_buf(),
            db,
            tables,
            multi_table,
        })
    }
}
