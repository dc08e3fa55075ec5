//! Staging manifest models
//!
//! Every input table file has a sidecar `<file>.manifest` written by the
//! storage platform. When the data lives in cloud storage the manifest
//! carries an `s3` or `abs` node pointing at it, with short-lived
//! credentials. Sliced files add a second level: the object the manifest
//! points at is itself a list of part-file URLs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Temporary AWS credentials issued for one export
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"****")
            .field("session_token", &"****")
            .finish()
    }
}

/// Location of the exported data on S3
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct S3Manifest {
    #[serde(rename = "isSliced", default)]
    pub is_sliced: bool,
    #[serde(default)]
    pub region: String,
    pub bucket: String,
    pub key: String,
    pub credentials: S3Credentials,
}

/// SAS connection string for one export
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbsCredentials {
    pub sas_connection_string: String,
}

impl std::fmt::Debug for AbsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbsCredentials")
            .field("sas_connection_string", &"****")
            .finish()
    }
}

/// Location of the exported data on Azure Blob Storage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbsManifest {
    #[serde(default)]
    pub is_sliced: bool,
    pub container: String,
    pub name: String,
    pub credentials: AbsCredentials,
}

/// Where the staged data physically lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingManifest {
    S3(S3Manifest),
    Abs(AbsManifest),
}

impl StagingManifest {
    /// Provider tag as used in the manifest file
    pub fn provider(&self) -> &'static str {
        match self {
            StagingManifest::S3(_) => "s3",
            StagingManifest::Abs(_) => "abs",
        }
    }

    pub fn is_sliced(&self) -> bool {
        match self {
            StagingManifest::S3(s3) => s3.is_sliced,
            StagingManifest::Abs(abs) => abs.is_sliced,
        }
    }
}

/// Sidecar manifest of one input table file
///
/// Only the provider nodes matter here; everything else the platform writes
/// (columns, primary key, metadata) is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs: Option<AbsManifest>,
}

impl TableManifest {
    /// Parse a manifest from its JSON text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content)
            .map_err(|e| ConfigError::Manifest(format!("invalid manifest: {}", e)))
    }

    /// Read and parse the manifest at `path`
    pub async fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ConfigError::Manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// The provider node, S3 taking precedence
    pub fn staging(&self) -> Option<StagingManifest> {
        if let Some(s3) = &self.s3 {
            return Some(StagingManifest::S3(s3.clone()));
        }
        self.abs.clone().map(StagingManifest::Abs)
    }
}

/// One part file of a sliced export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SliceEntry {
    pub url: String,
}

/// Manifest of parts for a sliced export
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlicedManifest {
    pub entries: Vec<SliceEntry>,
}

impl SlicedManifest {
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.url.as_str())
    }
}
