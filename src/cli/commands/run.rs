//! Load and connection-test commands

use std::path::PathBuf;

use tracing::info;

use crate::cli::error::CliError;
use crate::config::{Action, AppConfig};
use crate::database::SnowflakeConnection;
use crate::writer::{LoadStatus, Writer};

/// Arguments shared by every action
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Data directory holding `config.json` and `in/tables/`
    pub data_dir: PathBuf,
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}

/// Perform the action configured in `config.json`
pub fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    runtime()?.block_on(async {
        let config = AppConfig::load(&args.data_dir).await?;
        match config.action {
            Action::Run => load_tables(config).await,
            Action::TestConnection => test_connection(config).await,
        }
    })
}

/// Check the credentials regardless of the configured action
pub fn handle_test_connection(args: &RunArgs) -> Result<(), CliError> {
    runtime()?.block_on(async {
        let config = AppConfig::load(&args.data_dir).await?;
        test_connection(config).await
    })
}

async fn load_tables(config: AppConfig) -> Result<(), CliError> {
    let connection = SnowflakeConnection::new(config.db.clone())?;
    let writer = Writer::new(&connection, config.db.clone());
    writer.validate().await?;

    let reports = writer
        .write_all(&config.tables, config.multi_table)
        .await
        .into_result()?;

    let loaded = reports
        .iter()
        .filter(|report| report.status == LoadStatus::Succeeded)
        .count();
    info!("Loaded {} of {} table(s)", loaded, reports.len());
    Ok(())
}

async fn test_connection(config: AppConfig) -> Result<(), CliError> {
    let connection = SnowflakeConnection::new(config.db.clone())?;
    let writer = Writer::new(&connection, config.db);
    writer.validate().await?;
    writer.test_connection().await?;
    println!("{}", serde_json::json!({ "status": "success" }));
    Ok(())
}
