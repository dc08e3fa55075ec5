//! Table-level write operations
//!
//! [`WriteAdapter`] pairs a [`Connection`] with a [`QueryBuilder`] and runs
//! the individual steps of a load. Sequencing lives in
//! [`Writer`](super::Writer).

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::database::{Connection, DatabaseResult, QueryResult, row_str};
use crate::models::{Column, ForeignKey, TableLoadSpec};
use crate::writer::query_builder::QueryBuilder;
use crate::writer::storage::ObjectStore;
use crate::writer::strategy::WriteStrategy;
use crate::writer::{WriterError, WriterResult};

/// Maximum identifier length in Snowflake
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Length of the random per-run suffix
pub const RUN_SUFFIX_LENGTH: usize = 12;

const TMP_INFIX: &str = "_temp_";
const STAGE_PREFIX: &str = "db-writer-";

/// Random suffix shared by every staging name of one run
pub fn generate_run_suffix() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(RUN_SUFFIX_LENGTH)
        .collect()
}

/// `<name>_temp_<suffix>`, with `name` shortened so the whole stays a valid
/// identifier
pub fn generate_tmp_name(name: &str, run_suffix: &str) -> String {
    let budget = MAX_IDENTIFIER_LENGTH.saturating_sub(TMP_INFIX.len() + run_suffix.chars().count());
    let prefix: String = name.chars().take(budget).collect();
    format!("{}{}{}", prefix, TMP_INFIX, run_suffix)
}

/// `db-writer-<run id>`, dots replaced, cut to 255 characters and
/// right-trimmed of dashes
pub fn generate_stage_name(run_id: &str) -> String {
    let name = format!("{}{}", STAGE_PREFIX, run_id.replace('.', "-"));
    let name: String = name.chars().take(MAX_IDENTIFIER_LENGTH).collect();
    name.trim_end_matches('-').to_string()
}

/// Keep the first error; a cleanup failure only surfaces when nothing else
/// failed
pub(crate) fn with_cleanup<T>(
    result: WriterResult<T>,
    cleanup: DatabaseResult<()>,
    what: &str,
) -> WriterResult<T> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(error)) => Err(error.into()),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(cleanup_error)) => {
            warn!(error = %cleanup_error, "Cleanup of {} failed", what);
            Err(error)
        }
    }
}

/// Runs load steps against one connection
pub struct WriteAdapter<'a, C: Connection + ?Sized> {
    connection: &'a C,
    builder: QueryBuilder,
    run_suffix: String,
}

impl<'a, C: Connection + ?Sized> WriteAdapter<'a, C> {
    /// # Arguments
    ///
    /// * `connection` - Connection every statement runs on
    /// * `builder` - Statement builder for the target database and schema
    /// * `run_suffix` - Per-run suffix, see [`generate_run_suffix`]
    pub fn new(connection: &'a C, builder: QueryBuilder, run_suffix: impl Into<String>) -> Self {
        Self {
            connection,
            builder,
            run_suffix: run_suffix.into(),
        }
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn run_suffix(&self) -> &str {
        &self.run_suffix
    }

    async fn exec(&self, sql: &str) -> DatabaseResult<()> {
        debug!(sql = %sql, "Executing statement");
        self.connection.execute(sql).await
    }

    async fn fetch(&self, sql: &str) -> DatabaseResult<QueryResult> {
        debug!(sql = %sql, "Running query");
        self.connection.fetch_all(sql).await
    }

    /// Staging table name for `table`, unique to this run
    pub fn generate_tmp_name(&self, table: &str) -> String {
        generate_tmp_name(table, &self.run_suffix)
    }

    /// Stage name for this run; falls back to the run suffix without a run id
    pub fn stage_name(&self, run_id: Option<&str>) -> String {
        generate_stage_name(run_id.unwrap_or(&self.run_suffix))
    }

    pub async fn create(
        &self,
        table: &str,
        temporary: bool,
        items: &[Column],
        primary_key: Option<&[String]>,
    ) -> DatabaseResult<()> {
        info!("Creating table \"{}\"", table);
        self.exec(&self.builder.create_table(table, temporary, items, primary_key))
            .await
    }

    /// Create the staging table for `spec`
    ///
    /// Temporary when the connection keeps a session, a regular table
    /// otherwise. Either way the caller drops it.
    pub async fn create_staging(&self, table: &str, spec: &TableLoadSpec) -> DatabaseResult<()> {
        let temporary = self.connection.supports_temporary_tables();
        self.create(table, temporary, &spec.items, spec.primary_key.as_deref())
            .await
    }

    pub async fn drop_table(&self, table: &str) -> DatabaseResult<()> {
        info!("Dropping table \"{}\"", table);
        self.exec(&self.builder.drop_table(table)).await
    }

    pub async fn table_exists(&self, table: &str) -> DatabaseResult<bool> {
        let result = self.fetch(&self.builder.table_exists(table)).await?;
        Ok(!result.is_empty())
    }

    /// Copy the staged export into `table` through a run-scoped stage
    ///
    /// The stage is dropped before it is created and again after the copy,
    /// whether or not the copy succeeded.
    pub async fn write_data(
        &self,
        table: &str,
        spec: &TableLoadSpec,
        stage_name: &str,
        strategy: &dyn WriteStrategy,
        store: &dyn ObjectStore,
    ) -> WriterResult<()> {
        info!("Writing data to table \"{}\"", table);

        info!("Dropping stage \"{}\"", stage_name);
        self.exec(&self.builder.drop_stage(stage_name)).await?;

        info!("Creating stage \"{}\"", stage_name);
        self.exec(&strategy.create_stage_command(stage_name)).await?;

        let result = self
            .copy_into(table, spec, stage_name, strategy, store)
            .await;
        let cleanup = self.exec(&self.builder.drop_stage(stage_name)).await;
        with_cleanup(result, cleanup, "stage")
    }

    async fn copy_into(
        &self,
        table: &str,
        spec: &TableLoadSpec,
        stage_name: &str,
        strategy: &dyn WriteStrategy,
        store: &dyn ObjectStore,
    ) -> WriterResult<()> {
        let commands = strategy
            .copy_commands(&self.builder.qualified(table), stage_name, &spec.items, store)
            .await?;
        for command in commands {
            self.exec(&command).await?;
        }
        Ok(())
    }

    /// Exchange `staging` and `table`
    pub async fn swap_table(&self, table: &str, staging: &str) -> DatabaseResult<()> {
        info!("Swapping table \"{}\" with \"{}\"", staging, table);
        self.exec(&self.builder.swap_table(staging, table)).await
    }

    /// Merge `staging` into the target of `spec`
    ///
    /// With a primary key: make sure the target has the declared key, update
    /// matching rows, drop them from staging and insert the rest. Without a
    /// key every staged row is appended.
    pub async fn upsert(&self, spec: &TableLoadSpec, staging: &str) -> WriterResult<()> {
        info!("Upserting data to table \"{}\"", spec.db_name);

        if spec.has_primary_key() {
            self.add_primary_key_if_missing(&spec.db_name, spec.primary_key())
                .await?;
            self.check_primary_key(&spec.db_name, spec.primary_key())
                .await?;

            if let Some(update) = self.builder.upsert_update(spec, staging) {
                self.exec(&update).await?;
            }
            self.exec(&self.builder.upsert_delete(spec, staging)).await?;
        }

        self.exec(&self.builder.upsert_insert(spec, staging)).await?;
        Ok(())
    }

    /// Rows of `DESCRIBE TABLE`
    pub async fn describe(&self, table: &str) -> DatabaseResult<QueryResult> {
        self.fetch(&self.builder.table_info(table)).await
    }

    /// Primary key columns of `table` as the database reports them
    pub async fn primary_keys(&self, table: &str) -> DatabaseResult<Vec<String>> {
        let result = self.describe(table).await?;
        Ok(result
            .rows_where("primary key", "Y")
            .filter_map(|row| row_str(row, "name"))
            .map(str::to_string)
            .collect())
    }

    async fn add_primary_key_if_missing(
        &self,
        table: &str,
        primary_key: &[String],
    ) -> DatabaseResult<()> {
        if !self.primary_keys(table).await?.is_empty() {
            return Ok(());
        }
        info!("Adding primary key to table \"{}\"", table);
        self.exec(&self.builder.add_primary_key(table, primary_key))
            .await
    }

    /// Order-independent comparison of the declared and actual key
    pub async fn check_primary_key(&self, table: &str, primary_key: &[String]) -> WriterResult<()> {
        let mut in_db = self.primary_keys(table).await?;
        let mut configured = primary_key.to_vec();
        in_db.sort();
        configured.sort();

        if in_db != configured {
            return Err(WriterError::Configuration(format!(
                "Primary key(s) in configuration does NOT match with keys in DB table.\n\
                 Keys in configuration: {}\n\
                 Keys in DB table: {}",
                configured.join(","),
                in_db.join(",")
            )));
        }
        Ok(())
    }

    /// Add a unique key on `column` unless it has one or the table has a
    /// primary key
    pub async fn add_unique_key_if_missing(&self, table: &str, column: &str) -> DatabaseResult<()> {
        info!(
            "Adding unique key to table \"{}\" on column \"{}\"",
            table, column
        );
        let result = self.describe(table).await?;
        let has_unique = result
            .rows_where("unique key", "Y")
            .any(|row| row_str(row, "name") == Some(column));
        let has_primary = result.rows_where("primary key", "Y").next().is_some();

        if has_unique || has_primary {
            return Ok(());
        }
        self.exec(&self.builder.add_unique_key(table, column)).await
    }

    pub async fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        reference: &ForeignKey,
    ) -> DatabaseResult<()> {
        info!(
            "Creating foreign key from table \"{}\" to table \"{}\" on column \"{}\"",
            table, reference.table, column
        );
        self.exec(&self.builder.add_foreign_key(
            table,
            column,
            &reference.table,
            &reference.column,
        ))
        .await
    }

    async fn column_data_type(&self, table: &str, column: &str) -> WriterResult<Value> {
        let result = self.fetch(&self.builder.describe_columns(table)).await?;
        let row = result
            .rows_where("column_name", column)
            .next()
            .ok_or_else(|| {
                WriterError::Configuration(format!(
                    "Column '{}' in table '{}' not found",
                    column, table
                ))
            })?;

        let data_type = row_str(row, "data_type").ok_or_else(|| {
            WriterError::Configuration(format!(
                "Column '{}' in table '{}' has no data type",
                column, table
            ))
        })?;
        serde_json::from_str(data_type).map_err(|e| {
            WriterError::Configuration(format!(
                "Unreadable data type of column '{}' in table '{}': {}",
                column, table, e
            ))
        })
    }

    /// Whether two columns share type, length and nullability
    pub async fn is_same_type_columns(
        &self,
        source_table: &str,
        source_column: &str,
        target_table: &str,
        target_column: &str,
    ) -> WriterResult<bool> {
        let source = self.column_data_type(source_table, source_column).await?;
        let target = self.column_data_type(target_table, target_column).await?;

        Ok(["type", "length", "nullable"]
            .iter()
            .all(|field| source.get(field) == target.get(field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmp_name() {
        let name = generate_tmp_name("firstTable", "0123456789ab");
        assert_eq!(name, "firstTable_temp_0123456789ab");
    }

    #[test]
    fn test_tmp_name_long_table() {
        let table = "firstTableWithLongName".repeat(15);
        let name = generate_tmp_name(&table, "0123456789ab");
        assert_eq!(name.chars().count(), MAX_IDENTIFIER_LENGTH);
        assert!(name.ends_with("_temp_0123456789ab"));
        assert!(name.starts_with("firstTableWithLongName"));
    }

    #[test]
    fn test_run_suffix() {
        let a = generate_run_suffix();
        let b = generate_run_suffix();
        assert_eq!(a.len(), RUN_SUFFIX_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_stage_name() {
        assert_eq!(generate_stage_name("123.456.789"), "db-writer-123-456-789");
        assert_eq!(generate_stage_name(""), "db-writer");

        let long = generate_stage_name(&"1.".repeat(200));
        assert!(long.chars().count() <= MAX_IDENTIFIER_LENGTH);
        assert!(!long.ends_with('-'));
    }

    #[test]
    fn test_with_cleanup_keeps_first_error() {
        use crate::database::DatabaseError;

        let result: WriterResult<()> = with_cleanup(
            Err(WriterError::Configuration("load failed".into())),
            Err(DatabaseError::QueryFailed("drop failed".into())),
            "table",
        );
        assert_eq!(result.unwrap_err().to_string(), "load failed");

        let result = with_cleanup(Ok(()), Err(DatabaseError::QueryFailed("drop failed".into())), "table");
        assert!(matches!(result, Err(WriterError::Execution(_))));

        assert!(with_cleanup(Ok(1), Ok(()), "table").is_ok());
    }
}
