//! S3 staging strategy

use async_trait::async_trait;

use super::{WriteStrategy, parse_sliced_manifest, stage_file_format};
use crate::database::quote::{quote_identifier, quote_literal};
use crate::models::S3Manifest;
use crate::writer::storage::ObjectStore;
use crate::writer::{WriterError, WriterResult};

/// Loads from an S3 bucket with the export's temporary AWS credentials
#[derive(Debug, Clone)]
pub struct S3WriteStrategy {
    manifest: S3Manifest,
}

impl S3WriteStrategy {
    pub fn new(manifest: S3Manifest) -> Self {
        Self { manifest }
    }

    fn bucket_url(&self) -> String {
        format!("s3://{}", self.manifest.bucket)
    }

    fn key(&self) -> &str {
        self.manifest.key.trim_start_matches('/')
    }
}

#[async_trait(?Send)]
impl WriteStrategy for S3WriteStrategy {
    fn create_stage_command(&self, stage: &str) -> String {
        let credentials = &self.manifest.credentials;
        format!(
            "CREATE OR REPLACE STAGE {} FILE_FORMAT = {} URL = {} CREDENTIALS = (AWS_KEY_ID = {} AWS_SECRET_KEY = {} AWS_TOKEN = {})",
            quote_identifier(stage),
            stage_file_format(self.manifest.is_sliced),
            quote_literal(&self.bucket_url()),
            quote_literal(&credentials.access_key_id),
            quote_literal(&credentials.secret_access_key),
            quote_literal(&credentials.session_token)
        )
    }

    async fn source_files(&self, store: &dyn ObjectStore) -> WriterResult<Vec<String>> {
        if !self.manifest.is_sliced {
            return Ok(vec![format!("{}/{}", self.bucket_url(), self.key())]);
        }

        let content = store
            .get(&self.manifest.bucket, self.key())
            .await
            .map_err(|e| WriterError::DataSource(format!("Load error: {}", e)))?;

        let sliced = parse_sliced_manifest(&content)?;
        Ok(sliced.urls().map(str::to_string).collect())
    }

    fn stage_prefix(&self) -> String {
        format!("{}/", self.bucket_url())
    }
}
