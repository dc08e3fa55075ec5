//! Staging strategies
//!
//! Data exported to cloud storage is loaded through a named external stage:
//! one `CREATE OR REPLACE STAGE` pointing at the bucket or container, then
//! `COPY INTO` statements listing the files to read, at most
//! [`SLICED_FILES_CHUNK_SIZE`] per statement. The provider is picked from the
//! table manifest.

use async_trait::async_trait;
use tracing::info;

use crate::database::quote::{quote_identifier, quote_literal};
use crate::models::{Column, SlicedManifest, StagingManifest, TableManifest};
use crate::writer::storage::ObjectStore;
use crate::writer::{WriterError, WriterResult};

pub mod abs;
pub mod s3;
pub mod sql_helper;

pub use abs::AbsWriteStrategy;
pub use s3::S3WriteStrategy;

/// Maximum number of files referenced by one `COPY INTO`
pub const SLICED_FILES_CHUNK_SIZE: usize = 1000;

/// Provider-specific stage and copy command generation
#[async_trait(?Send)]
pub trait WriteStrategy {
    /// `CREATE OR REPLACE STAGE` pointing at the export location
    fn create_stage_command(&self, stage: &str) -> String;

    /// Full URLs of every file to load
    async fn source_files(&self, store: &dyn ObjectStore) -> WriterResult<Vec<String>>;

    /// URL prefix of the stage location, stripped from file URLs
    fn stage_prefix(&self) -> String;

    /// One `COPY INTO` per chunk of source files
    ///
    /// # Arguments
    ///
    /// * `table` - Already quoted, schema-qualified target table
    /// * `stage` - Stage name
    /// * `items` - All columns in source order, ignored ones included
    /// * `store` - Store used to read a sliced manifest
    async fn copy_commands(
        &self,
        table: &str,
        stage: &str,
        items: &[Column],
        store: &dyn ObjectStore,
    ) -> WriterResult<Vec<String>> {
        let files = self.source_files(store).await?;
        Ok(build_copy_commands(
            table,
            stage,
            items,
            &files,
            &self.stage_prefix(),
        ))
    }
}

/// Pick the strategy for a table manifest
pub fn select_strategy(manifest: &TableManifest) -> WriterResult<Box<dyn WriteStrategy>> {
    match manifest.staging() {
        Some(StagingManifest::S3(s3)) => {
            info!("Using S3 write strategy");
            Ok(Box::new(S3WriteStrategy::new(s3)))
        }
        Some(StagingManifest::Abs(abs)) => {
            info!("Using ABS write strategy");
            Ok(Box::new(AbsWriteStrategy::new(abs)?))
        }
        None => Err(WriterError::Configuration(
            "Unknown input adapter".to_string(),
        )),
    }
}

/// `FILE_FORMAT` options of the external stage
///
/// Sliced files carry no header row, single files do.
pub fn stage_file_format(is_sliced: bool) -> String {
    let mut options = vec![
        format!("FIELD_DELIMITER = {}", quote_literal(",")),
        format!("FIELD_OPTIONALLY_ENCLOSED_BY = {}", quote_literal("\"")),
        format!("ESCAPE_UNENCLOSED_FIELD = {}", quote_literal("\\")),
    ];
    if !is_sliced {
        options.push("SKIP_HEADER = 1".to_string());
    }
    format!("(TYPE=CSV {})", options.join(" "))
}

/// Build the chunked `COPY INTO` statements for `files`
pub fn build_copy_commands(
    table: &str,
    stage: &str,
    items: &[Column],
    files: &[String],
    prefix: &str,
) -> Vec<String> {
    let columns = sql_helper::quoted_column_names(items).join(", ");
    let transformations = sql_helper::column_transformations(items).join(", ");
    let stage_location = quote_literal(&format!("@{}/", quote_identifier(stage)));

    files
        .chunks(SLICED_FILES_CHUNK_SIZE)
        .map(|chunk| {
            let quoted_files: Vec<String> = chunk
                .iter()
                .map(|file| quote_literal(&file.replace(prefix, "")))
                .collect();
            format!(
                "COPY INTO {}({}) FROM (SELECT {} FROM {} t) FILES = ({})",
                table,
                columns,
                transformations,
                stage_location,
                quoted_files.join(",")
            )
        })
        .collect()
}

/// Parse a fetched manifest of parts
///
/// A manifest listing no parts is an error: loading it would leave the
/// staging table empty.
pub(crate) fn parse_sliced_manifest(content: &[u8]) -> WriterResult<SlicedManifest> {
    let sliced: SlicedManifest = serde_json::from_slice(content).map_err(|e| {
        WriterError::DataSource(format!("Load error: invalid manifest of parts: {}", e))
    })?;
    if sliced.entries.is_empty() {
        return Err(WriterError::DataSource(
            "Load error: manifest of parts lists no files".to_string(),
        ));
    }
    Ok(sliced)
}
