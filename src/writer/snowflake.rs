//! Load orchestrator
//!
//! A [`Writer`] drives table loads over one connection, one table at a time:
//!
//! ```text
//! Idle -> StagingCreated -> DataLoaded -> Swapped | Merged -> CleanedUp -> Done
//! ```
//!
//! Any failure moves the load to `Failed`. The staging table is dropped on
//! every path once it has been created. Foreign keys are added after all
//! tables of a batch are loaded.

use std::cell::RefCell;
use std::fmt;

use tracing::{error, info, warn};

use crate::database::{Connection, DatabaseConfig, row_str};
use crate::models::{ForeignKey, TableLoadSpec, TableManifest};
use crate::writer::adapter::{WriteAdapter, generate_run_suffix, with_cleanup};
use crate::writer::query_builder::QueryBuilder;
use crate::writer::storage::{LazyObjectStore, ObjectStore};
use crate::writer::strategy::select_strategy;
use crate::writer::{WriterError, WriterResult, is_missing_object};

/// `DESC USER` property holding the default warehouse
const DEFAULT_WAREHOUSE_PROPERTY: &str = "DEFAULT_WAREHOUSE";

/// Progress of one table load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    StagingCreated,
    DataLoaded,
    Swapped,
    Merged,
    CleanedUp,
    Done,
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadState::Idle => "idle",
            LoadState::StagingCreated => "staging created",
            LoadState::DataLoaded => "data loaded",
            LoadState::Swapped => "swapped",
            LoadState::Merged => "merged",
            LoadState::CleanedUp => "cleaned up",
            LoadState::Done => "done",
            LoadState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Succeeded,
    Skipped,
    Failed(String),
}

/// Per-table result of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Target table name
    pub table: String,
    pub status: LoadStatus,
    /// Final state; `Failed` when the load did not complete
    pub state: LoadState,
    /// Last state reached before the outcome was decided
    pub reached: LoadState,
}

/// Reports of a batch plus the error that stopped it, if any
#[derive(Debug)]
pub struct BatchOutcome {
    pub reports: Vec<LoadReport>,
    pub error: Option<WriterError>,
}

impl BatchOutcome {
    pub fn into_result(self) -> WriterResult<Vec<LoadReport>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.reports),
        }
    }
}

/// Snowflake load orchestrator
pub struct Writer<'a, C: Connection + ?Sized> {
    connection: &'a C,
    config: DatabaseConfig,
    adapter: WriteAdapter<'a, C>,
    object_store: Option<Box<dyn ObjectStore>>,
    warehouse: RefCell<Option<String>>,
}

impl<'a, C: Connection + ?Sized> Writer<'a, C> {
    /// Create a writer with a fresh run suffix
    ///
    /// # Arguments
    ///
    /// * `connection` - Connection every statement runs on
    /// * `config` - Target database, schema, warehouse and run id
    pub fn new(connection: &'a C, config: DatabaseConfig) -> Self {
        Self::with_run_suffix(connection, config, generate_run_suffix())
    }

    /// Create a writer with a fixed run suffix
    pub fn with_run_suffix(
        connection: &'a C,
        config: DatabaseConfig,
        run_suffix: impl Into<String>,
    ) -> Self {
        let adapter = WriteAdapter::new(connection, QueryBuilder::from_config(&config), run_suffix);
        Self {
            connection,
            warehouse: RefCell::new(config.warehouse.clone()),
            config,
            adapter,
            object_store: None,
        }
    }

    /// Read sliced manifests from `store` instead of the provider's client
    pub fn with_object_store(mut self, store: Box<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn adapter(&self) -> &WriteAdapter<'a, C> {
        &self.adapter
    }

    /// Warehouse in use, once validated
    pub fn warehouse(&self) -> Option<String> {
        self.warehouse.borrow().clone()
    }

    /// Run `SELECT current_date;` to prove the connection works
    pub async fn test_connection(&self) -> WriterResult<()> {
        self.connection
            .fetch_all(&self.adapter.builder().test_connection())
            .await?;
        Ok(())
    }

    /// Select the warehouse and schema before any DDL
    ///
    /// Without a configured warehouse the user's `DEFAULT_WAREHOUSE` is used.
    /// A missing warehouse or schema is a configuration error.
    pub async fn validate(&self) -> WriterResult<()> {
        let configured = self.config.warehouse.clone();
        info!(
            "Validating warehouse \"{}\"",
            configured.as_deref().unwrap_or_default()
        );

        let warehouse = match configured {
            Some(warehouse) => Some(warehouse),
            None => self.user_default_warehouse().await?,
        };
        let warehouse = warehouse.ok_or_else(|| {
            WriterError::Configuration(
                "Snowflake user has any \"DEFAULT_WAREHOUSE\" specified. Set \"warehouse\" parameter."
                    .to_string(),
            )
        })?;

        let builder = self.adapter.builder();
        if let Err(e) = self
            .connection
            .execute(&builder.use_warehouse(&warehouse))
            .await
        {
            if is_missing_object(&e) {
                return Err(WriterError::Configuration(format!(
                    "Invalid warehouse \"{}\" specified",
                    warehouse
                )));
            }
            return Err(e.into());
        }
        self.connection.use_warehouse(&warehouse);
        *self.warehouse.borrow_mut() = Some(warehouse);

        let schema = &self.config.schema;
        info!("Validating schema \"{}\"", schema);
        if let Err(e) = self.connection.execute(&builder.use_schema(schema)).await {
            if is_missing_object(&e) {
                return Err(WriterError::Configuration(format!(
                    "Invalid schema \"{}\" specified",
                    schema
                )));
            }
            return Err(e.into());
        }

        Ok(())
    }

    async fn user_default_warehouse(&self) -> WriterResult<Option<String>> {
        let builder = self.adapter.builder();
        let current = self.connection.fetch_all(&builder.current_user()).await?;
        let Some(user) = current
            .rows
            .first()
            .and_then(|row| row_str(row, "CURRENT_USER"))
        else {
            return Ok(None);
        };

        let properties = self
            .connection
            .fetch_all(&builder.describe_user(user))
            .await?;
        let defaults: Vec<_> = properties
            .rows_where("property", DEFAULT_WAREHOUSE_PROPERTY)
            .collect();
        if defaults.len() != 1 {
            return Ok(None);
        }

        Ok(row_str(defaults[0], "value")
            .filter(|value| *value != "null")
            .map(str::to_string))
    }

    /// Load one table, swapping or upserting per `spec.incremental`
    ///
    /// Tables with `export` off are skipped without touching the database.
    pub async fn write(&self, spec: &TableLoadSpec) -> WriterResult<LoadReport> {
        let (report, result) = self.run_load(spec).await;
        result.map(|()| report)
    }

    async fn run_load(&self, spec: &TableLoadSpec) -> (LoadReport, WriterResult<()>) {
        if !spec.export {
            info!("Table \"{}\" is not exported, skipping", spec.db_name);
            let report = LoadReport {
                table: spec.db_name.clone(),
                status: LoadStatus::Skipped,
                state: LoadState::Idle,
                reached: LoadState::Idle,
            };
            return (report, Ok(()));
        }

        let mut reached = LoadState::Idle;
        let result = if spec.incremental {
            self.write_incremental(spec, &mut reached).await
        } else {
            self.write_full(spec, &mut reached).await
        };

        let report = match &result {
            Ok(()) => {
                info!("Table \"{}\" loaded", spec.db_name);
                LoadReport {
                    table: spec.db_name.clone(),
                    status: LoadStatus::Succeeded,
                    state: LoadState::Done,
                    reached,
                }
            }
            Err(e) => {
                error!(
                    "Load of table \"{}\" failed after {}: {}",
                    spec.db_name, reached, e
                );
                LoadReport {
                    table: spec.db_name.clone(),
                    status: LoadStatus::Failed(e.to_string()),
                    state: LoadState::Failed,
                    reached,
                }
            }
        };
        (report, result)
    }

    /// Full load: stage, create target if needed, copy, swap, drop staging
    pub async fn write_full(
        &self,
        spec: &TableLoadSpec,
        reached: &mut LoadState,
    ) -> WriterResult<()> {
        let staging = self.adapter.generate_tmp_name(&spec.db_name);

        // SWAP WITH needs two permanent tables
        self.adapter
            .create(&staging, false, &spec.items, spec.primary_key.as_deref())
            .await?;
        *reached = LoadState::StagingCreated;

        let result = self.full_load_steps(spec, &staging, reached).await;
        let cleanup = self.adapter.drop_table(&staging).await;
        let result = with_cleanup(result, cleanup, "staging table");
        if result.is_ok() {
            *reached = LoadState::CleanedUp;
        }
        result
    }

    async fn full_load_steps(
        &self,
        spec: &TableLoadSpec,
        staging: &str,
        reached: &mut LoadState,
    ) -> WriterResult<()> {
        self.adapter
            .create(&spec.db_name, false, &spec.items, spec.primary_key.as_deref())
            .await?;
        self.load_data(staging, spec).await?;
        *reached = LoadState::DataLoaded;

        self.adapter.swap_table(&spec.db_name, staging).await?;
        *reached = LoadState::Swapped;
        Ok(())
    }

    /// Incremental load: create target if needed, stage, copy, upsert, drop staging
    pub async fn write_incremental(
        &self,
        spec: &TableLoadSpec,
        reached: &mut LoadState,
    ) -> WriterResult<()> {
        let staging = self.adapter.generate_tmp_name(&spec.db_name);

        self.adapter
            .create(&spec.db_name, false, &spec.items, spec.primary_key.as_deref())
            .await?;
        self.adapter.create_staging(&staging, spec).await?;
        *reached = LoadState::StagingCreated;

        let result = self.incremental_load_steps(spec, &staging, reached).await;
        let cleanup = self.adapter.drop_table(&staging).await;
        let result = with_cleanup(result, cleanup, "staging table");
        if result.is_ok() {
            *reached = LoadState::CleanedUp;
        }
        result
    }

    async fn incremental_load_steps(
        &self,
        spec: &TableLoadSpec,
        staging: &str,
        reached: &mut LoadState,
    ) -> WriterResult<()> {
        self.load_data(staging, spec).await?;
        *reached = LoadState::DataLoaded;

        self.adapter.upsert(spec, staging).await?;
        *reached = LoadState::Merged;
        Ok(())
    }

    /// Resolve the manifest and copy the export into `table`
    async fn load_data(&self, table: &str, spec: &TableLoadSpec) -> WriterResult<()> {
        let manifest = TableManifest::read(&spec.manifest_path())
            .await
            .map_err(|e| WriterError::DataSource(e.to_string()))?;
        let strategy = select_strategy(&manifest)?;
        let stage_name = self.adapter.stage_name(self.config.run_id.as_deref());

        let lazy;
        let store: &dyn ObjectStore = match &self.object_store {
            Some(store) => store.as_ref(),
            None => {
                let staging = manifest.staging().ok_or_else(|| {
                    WriterError::Configuration("Unknown input adapter".to_string())
                })?;
                lazy = LazyObjectStore::new(staging);
                &lazy
            }
        };

        self.adapter
            .write_data(table, spec, &stage_name, strategy.as_ref(), store)
            .await
    }

    /// Load `specs` in order, stopping at the first failure
    ///
    /// Tables loaded before a failure stay loaded. With `create_foreign_keys`
    /// the foreign key pass runs once every table succeeded.
    pub async fn write_all(
        &self,
        specs: &[TableLoadSpec],
        create_foreign_keys: bool,
    ) -> BatchOutcome {
        let mut reports = Vec::with_capacity(specs.len());

        for spec in specs {
            let (report, result) = self.run_load(spec).await;
            reports.push(report);
            if let Err(error) = result {
                return BatchOutcome {
                    reports,
                    error: Some(error),
                };
            }
        }

        let error = if create_foreign_keys {
            self.create_foreign_keys(specs).await.err()
        } else {
            None
        };
        BatchOutcome { reports, error }
    }

    /// Add the declared foreign keys of every exported table
    ///
    /// A reference names a configured table by storage id or database name
    /// and one of its columns by name or database name. References to tables
    /// that do not exist are skipped. Referencing and referenced columns must
    /// share type, length and nullability; the referenced column gets a
    /// unique key when it has neither a unique nor a primary key.
    pub async fn create_foreign_keys(&self, specs: &[TableLoadSpec]) -> WriterResult<()> {
        for spec in specs.iter().filter(|spec| spec.export) {
            for (column, reference) in spec.foreign_keys() {
                let Some(target) = specs.iter().find(|other| {
                    other.table_id == reference.table || other.db_name == reference.table
                }) else {
                    warn!(
                        "Foreign key table \"{}\" of column \"{}\" is not part of the configuration",
                        reference.table, column
                    );
                    continue;
                };
                let Some(target_column) = target
                    .items
                    .iter()
                    .filter(|item| !item.is_ignored())
                    .find(|item| item.name == reference.column || item.db_name == reference.column)
                else {
                    warn!(
                        "Foreign key column \"{}\" not found in table \"{}\"",
                        reference.column, target.db_name
                    );
                    continue;
                };

                if !self.adapter.table_exists(&target.db_name).await? {
                    warn!("Table \"{}\" does not exist, skipping foreign key", target.db_name);
                    continue;
                }

                let resolved = ForeignKey {
                    table: target.db_name.clone(),
                    column: target_column.db_name.clone(),
                };
                if !self
                    .adapter
                    .is_same_type_columns(&spec.db_name, column, &resolved.table, &resolved.column)
                    .await?
                {
                    return Err(WriterError::Configuration(format!(
                        "Foreign key column \"{}\" in table \"{}\" has different type than column \"{}\" in table \"{}\"",
                        column, spec.db_name, resolved.column, resolved.table
                    )));
                }

                self.adapter
                    .add_unique_key_if_missing(&resolved.table, &resolved.column)
                    .await?;
                self.adapter
                    .add_foreign_key(&spec.db_name, column, &resolved)
                    .await?;
            }
        }
        Ok(())
    }
}
