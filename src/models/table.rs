//! Table load model
//!
//! One [`TableLoadSpec`] describes one load: which CSV to read, which
//! columns to materialize, and whether to swap or upsert.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::column::{Column, ForeignKey, RawColumn};
use crate::config::{ConfigError, InputTable};
use crate::validation::{validate_identifier, validate_items, validate_primary_key};

/// Suffix of the sidecar manifest next to each input table file
pub const MANIFEST_SUFFIX: &str = ".manifest";

fn default_true() -> bool {
    true
}

/// Raw table entry (`parameters.tables[]` or a config row's parameters)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTableConfig {
    #[serde(default)]
    pub table_id: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub items: Vec<RawColumn>,
    #[serde(default)]
    pub primary_key: Option<Vec<String>>,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default = "default_true")]
    pub export: bool,
}

/// Validated description of one table load
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableLoadSpec {
    /// Storage table id the data comes from
    pub table_id: String,
    /// Target table name
    pub db_name: String,
    /// Columns in source file order, ignored ones included
    pub items: Vec<Column>,
    /// Declared primary key, in configured order
    pub primary_key: Option<Vec<String>>,
    /// Upsert into the target instead of replacing it
    pub incremental: bool,
    /// `false` skips the table entirely
    pub export: bool,
    /// Local path of the input CSV; the manifest sits beside it
    pub table_file_path: PathBuf,
}

impl TableLoadSpec {
    /// Create a full-load spec with no primary key
    ///
    /// # Arguments
    ///
    /// * `table_id` - Storage table id
    /// * `db_name` - Target table name
    /// * `items` - Columns in source file order
    /// * `table_file_path` - Path of the input CSV
    pub fn new(
        table_id: impl Into<String>,
        db_name: impl Into<String>,
        items: Vec<Column>,
        table_file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            db_name: db_name.into(),
            items,
            primary_key: None,
            incremental: false,
            export: true,
            table_file_path: table_file_path.into(),
        }
    }

    pub fn with_primary_key<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.primary_key = if keys.is_empty() { None } else { Some(keys) };
        self
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    /// Validate a raw table entry against the input mapping
    ///
    /// The input file is resolved as `<data_dir>/in/tables/<destination>` of
    /// the mapping whose `source` equals the table id.
    pub fn from_raw(
        raw: RawTableConfig,
        input_tables: &[InputTable],
        data_dir: &Path,
    ) -> Result<Self, ConfigError> {
        if raw.table_id.trim().is_empty() {
            return Err(ConfigError::MissingField("tableId".to_string()));
        }
        validate_identifier("dbName", &raw.db_name)?;

        let mapping = input_tables
            .iter()
            .find(|input| input.source == raw.table_id)
            .ok_or_else(|| ConfigError::UnknownInputTable(raw.table_id.clone()))?;

        let items = raw
            .items
            .into_iter()
            .map(Column::from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        validate_items(&items)?;

        let primary_key = raw.primary_key.filter(|keys| !keys.is_empty());
        if let Some(keys) = &primary_key {
            validate_primary_key(&items, keys)?;
        }

        Ok(Self {
            table_id: raw.table_id,
            db_name: raw.db_name,
            items,
            primary_key,
            incremental: raw.incremental,
            export: raw.export,
            table_file_path: data_dir.join("in").join("tables").join(&mapping.destination),
        })
    }

    /// Columns that appear in generated statements
    pub fn active_items(&self) -> impl Iterator<Item = &Column> {
        self.items.iter().filter(|item| !item.is_ignored())
    }

    /// Primary key columns, empty when none is declared
    pub fn primary_key(&self) -> &[String] {
        self.primary_key.as_deref().unwrap_or_default()
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key().is_empty()
    }

    /// Declared foreign keys as `(column db_name, reference)` pairs
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&str, &ForeignKey)> {
        self.active_items().filter_map(|item| {
            item.foreign_key
                .as_ref()
                .map(|fk| (item.db_name.as_str(), fk))
        })
    }

    /// Path of the sidecar manifest
    pub fn manifest_path(&self) -> PathBuf {
        let mut path = self.table_file_path.clone().into_os_string();
        path.push(MANIFEST_SUFFIX);
        PathBuf::from(path)
    }
}
