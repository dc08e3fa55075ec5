//! Azure Blob Storage staging strategy

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{WriteStrategy, parse_sliced_manifest, stage_file_format};
use crate::database::quote::{quote_identifier, quote_literal};
use crate::models::AbsManifest;
use crate::writer::storage::ObjectStore;
use crate::writer::{WriterError, WriterResult};

static SAS_CONNECTION_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"BlobEndpoint=https?://(.+);SharedAccessSignature=(.+)").expect("Invalid regex")
});

/// Endpoint host and SAS token from a SAS connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasConnection {
    pub endpoint: String,
    pub sas_token: String,
}

/// Split `BlobEndpoint=https://<host>;SharedAccessSignature=<sas>`
pub fn parse_sas_connection_string(value: &str) -> Option<SasConnection> {
    let captures = SAS_CONNECTION_STRING.captures(value)?;
    Some(SasConnection {
        endpoint: captures.get(1)?.as_str().to_string(),
        sas_token: captures.get(2)?.as_str().to_string(),
    })
}

/// Loads from an Azure Blob container with the export's SAS token
#[derive(Debug, Clone)]
pub struct AbsWriteStrategy {
    manifest: AbsManifest,
    connection: SasConnection,
}

impl AbsWriteStrategy {
    pub fn new(manifest: AbsManifest) -> WriterResult<Self> {
        let connection = parse_sas_connection_string(&manifest.credentials.sas_connection_string)
            .ok_or_else(|| {
                WriterError::Configuration(
                    "Invalid Azure Blob Storage SAS connection string in manifest.".to_string(),
                )
            })?;
        Ok(Self {
            manifest,
            connection,
        })
    }

    fn container_url(&self) -> String {
        format!(
            "https://{}/{}",
            self.connection.endpoint, self.manifest.container
        )
    }
}

#[async_trait(?Send)]
impl WriteStrategy for AbsWriteStrategy {
    fn create_stage_command(&self, stage: &str) -> String {
        format!(
            "CREATE OR REPLACE STAGE {} FILE_FORMAT = {} URL = {} CREDENTIALS = (AZURE_SAS_TOKEN = {})",
            quote_identifier(stage),
            stage_file_format(self.manifest.is_sliced),
            quote_literal(&format!(
                "azure://{}/{}",
                self.connection.endpoint, self.manifest.container
            )),
            quote_literal(&self.connection.sas_token)
        )
    }

    async fn source_files(&self, store: &dyn ObjectStore) -> WriterResult<Vec<String>> {
        if !self.manifest.is_sliced {
            return Ok(vec![format!(
                "{}/{}",
                self.container_url(),
                self.manifest.name.trim_start_matches('/')
            )]);
        }

        let content = store
            .get(&self.manifest.container, &self.manifest.name)
            .await
            .map_err(|_| {
                WriterError::DataSource("Load error: manifest file was not found.".to_string())
            })?;

        let sliced = parse_sliced_manifest(&content)?;
        Ok(sliced
            .urls()
            .map(|url| url.replace("azure://", "https://"))
            .collect())
    }

    fn stage_prefix(&self) -> String {
        format!("{}/", self.container_url())
    }
}
