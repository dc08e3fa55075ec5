//! Column model for table loads

use serde::{Deserialize, Deserializer, Serialize};

use crate::validation::input::{ValidationError, ValidationResult, validate_identifier};

/// Data type marking a source column that is never materialized
pub const IGNORE_TYPE: &str = "ignore";

/// Types that accept a size/precision suffix, compared case-insensitively
pub const TYPES_WITH_SIZE: &[&str] = &[
    "number",
    "decimal",
    "numeric",
    "char",
    "character",
    "varchar",
    "string",
    "text",
    "binary",
];

/// Foreign key reference to another table's column, by name only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referenced table (target database name)
    pub table: String,
    /// Referenced column in that table
    pub column: String,
}

/// Raw `items[]` entry as found in `config.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawColumn {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default, rename = "type")]
    pub data_type: String,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<String>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub foreign_key_table: Option<String>,
    #[serde(default)]
    pub foreign_key_column: Option<String>,
}

/// Accept the size as `"255"`, `"10,2"` or a bare number
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) if n.as_u64() != Some(0) => Some(n.to_string()),
        _ => None,
    })
}

/// Column model: one column to materialize in the target table
///
/// Columns are built once from validated configuration and never change.
/// A column typed `ignore` keeps its position in the source file but is
/// left out of every generated statement.
///
/// # Example
///
/// ```rust
/// use db_writer_snowflake::models::Column;
///
/// let column = Column::new("id", "id", "int").with_nullable(false);
/// assert!(!column.is_nullable());
/// assert!(!column.is_ignored());
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Column {
    /// Source column id
    pub name: String,
    /// Target column name
    pub db_name: String,
    /// Target SQL type, as configured
    pub data_type: String,
    /// Size or precision, e.g. `255` or `10,2`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Nullability; absent means nullable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    /// Default value literal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Foreign key reference, created after all tables are loaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

impl Column {
    /// Create a nullable column without size, default or foreign key
    ///
    /// # Arguments
    ///
    /// * `name` - Source column id
    /// * `db_name` - Target column name
    /// * `data_type` - Target SQL type
    pub fn new(
        name: impl Into<String>,
        db_name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            db_name: db_name.into(),
            data_type: data_type.into(),
            size: None,
            nullable: None,
            default: None,
            foreign_key: None,
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_foreign_key(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Validate a raw `items[]` entry
    ///
    /// Ignored columns only need a name; everything else needs a target name
    /// and type, and the foreign key pair must be complete or absent.
    pub fn from_raw(raw: RawColumn) -> ValidationResult<Self> {
        if raw.name.trim().is_empty() {
            return Err(ValidationError::Empty("item name"));
        }
        if raw.data_type.trim().is_empty() {
            return Err(ValidationError::Empty("item type"));
        }

        let ignored = raw.data_type.eq_ignore_ascii_case(IGNORE_TYPE);
        if !ignored {
            validate_identifier("item dbName", &raw.db_name)?;
        }

        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let foreign_key = match (
            non_empty(raw.foreign_key_table),
            non_empty(raw.foreign_key_column),
        ) {
            (Some(table), Some(column)) => Some(ForeignKey { table, column }),
            (None, None) => None,
            _ => {
                return Err(ValidationError::IncompleteForeignKey(raw.db_name));
            }
        };

        Ok(Self {
            name: raw.name,
            db_name: raw.db_name,
            data_type: raw.data_type,
            size: raw.size,
            nullable: raw.nullable,
            default: non_empty(raw.default),
            foreign_key,
        })
    }

    /// Whether the column is excluded from generated statements
    pub fn is_ignored(&self) -> bool {
        self.data_type.eq_ignore_ascii_case(IGNORE_TYPE)
    }

    /// Whether the column accepts NULL (absent means yes)
    pub fn is_nullable(&self) -> bool {
        self.nullable.unwrap_or(true)
    }

    /// Whether the type takes a `(size)` suffix
    pub fn is_sized_type(&self) -> bool {
        TYPES_WITH_SIZE
            .iter()
            .any(|t| self.data_type.eq_ignore_ascii_case(t))
    }

    /// Whether the type is the unstructured text type (no defaults)
    pub fn is_text(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("text")
    }
}
