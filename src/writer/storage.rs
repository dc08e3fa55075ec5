//! Object stores for sliced-file manifests
//!
//! A sliced export is described by a "manifest of parts" object stored next
//! to the parts. The strategies read it through an [`ObjectStore`], built
//! from the short-lived credentials of the table manifest.

use async_trait::async_trait;

#[cfg(feature = "s3")]
use crate::models::S3Manifest;
use crate::models::{AbsManifest, StagingManifest};

/// Error type for object reads
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Object missing or access denied
    #[error("{0}")]
    NotFound(String),

    /// Request or transport failure
    #[error("{0}")]
    Request(String),

    /// Store configuration unusable
    #[error("{0}")]
    Configuration(String),
}

/// Read-only access to a bucket or container
#[async_trait(?Send)]
pub trait ObjectStore {
    /// Fetch the whole object at `key` in `container`
    async fn get(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Build the store matching a staging manifest
pub async fn object_store_for(
    manifest: &StagingManifest,
) -> Result<Box<dyn ObjectStore>, StorageError> {
    match manifest {
        #[cfg(feature = "s3")]
        StagingManifest::S3(s3) => Ok(Box::new(S3ObjectStore::from_manifest(s3).await)),
        #[cfg(not(feature = "s3"))]
        StagingManifest::S3(_) => Err(StorageError::Configuration(
            "S3 support is not enabled in this build".to_string(),
        )),
        StagingManifest::Abs(abs) => Ok(Box::new(AbsObjectStore::from_manifest(abs)?)),
    }
}

/// Store built from a staging manifest on its first read
///
/// Single-file exports never read an object, so no client is set up for them.
pub struct LazyObjectStore {
    manifest: StagingManifest,
    store: tokio::sync::OnceCell<Box<dyn ObjectStore>>,
}

impl LazyObjectStore {
    pub fn new(manifest: StagingManifest) -> Self {
        Self {
            manifest,
            store: tokio::sync::OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.store.initialized()
    }
}

#[async_trait(?Send)]
impl ObjectStore for LazyObjectStore {
    async fn get(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let store = self
            .store
            .get_or_try_init(|| object_store_for(&self.manifest))
            .await?;
        store.get(container, key).await
    }
}

/// S3 store using the export's temporary credentials
#[cfg(feature = "s3")]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

#[cfg(feature = "s3")]
impl S3ObjectStore {
    pub async fn from_manifest(manifest: &S3Manifest) -> Self {
        use aws_config::{BehaviorVersion, Region};
        use aws_credential_types::Credentials;

        let credentials = Credentials::new(
            manifest.credentials.access_key_id.clone(),
            manifest.credentials.secret_access_key.clone(),
            Some(manifest.credentials.session_token.clone()),
            None,
            "storage-manifest",
        );

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).credentials_provider(credentials);
        if !manifest.region.is_empty() {
            loader = loader.region(Region::new(manifest.region.clone()));
        }

        let config = loader.load().await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
        }
    }
}

#[cfg(feature = "s3")]
#[async_trait(?Send)]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key.trim_start_matches('/'))
            .send()
            .await
            .map_err(|e| {
                let e = aws_sdk_s3::error::DisplayErrorContext(e);
                StorageError::NotFound(e.to_string())
            })?;

        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?
            .into_bytes();
        Ok(bytes.to_vec())
    }
}

/// Azure Blob store authenticated with a SAS token
pub struct AbsObjectStore {
    client: reqwest::Client,
    endpoint: String,
    sas_token: String,
}

impl AbsObjectStore {
    /// # Arguments
    ///
    /// * `endpoint` - Blob endpoint host, without scheme
    /// * `sas_token` - Shared access signature query string
    pub fn new(endpoint: impl Into<String>, sas_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            sas_token: sas_token.into(),
        }
    }

    pub fn from_manifest(manifest: &AbsManifest) -> Result<Self, StorageError> {
        let connection = crate::writer::strategy::abs::parse_sas_connection_string(
            &manifest.credentials.sas_connection_string,
        )
        .ok_or_else(|| {
            StorageError::Configuration("invalid SAS connection string".to_string())
        })?;
        Ok(Self::new(connection.endpoint, connection.sas_token))
    }

    fn blob_url(&self, container: &str, name: &str) -> String {
        let path: Vec<String> = name
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!(
            "https://{}/{}/{}?{}",
            self.endpoint,
            urlencoding::encode(container),
            path.join("/"),
            self.sas_token.trim_start_matches('?')
        )
    }
}

#[async_trait(?Send)]
impl ObjectStore for AbsObjectStore {
    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .client
            .get(self.blob_url(container, name))
            .header("x-ms-version", "2021-08-06")
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::NotFound(format!(
                "blob {}/{} returned {}",
                container, name, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
