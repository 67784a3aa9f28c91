//! Storage backend holding uploaded plan images.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::header::CONTENT_TYPE;

/// Characters escaped inside one object path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'?')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Raw object bytes and the content type the backend reported.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object {bucket}/{path} not found")]
    NotFound { bucket: String, path: String },

    #[error("storage backend returned {status} for {bucket}/{path}")]
    Status {
        bucket: String,
        path: String,
        status: u16,
    },

    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Read access to bucket-relative objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_by_path(&self, bucket: &str, path: &str) -> Result<StoredObject, StorageError>;
}

/// Connection settings for the object storage REST API.
#[derive(Clone)]
pub struct StorageConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    /// Service key sent as bearer token and `apikey` header.
    pub service_key: String,
    /// Logical bucket holding plan uploads.
    pub bucket: String,
    pub timeout: Duration,
}

impl StorageConfig {
    pub const DEFAULT_BUCKET: &str = "house-plans";
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("base_url", &self.base_url)
            .field("service_key", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// [`ObjectStore`] over the storage REST API
/// (`GET {base}/storage/v1/object/{bucket}/{path}`).
#[derive(Clone)]
pub struct HttpObjectStore {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(http: reqwest::Client, config: &StorageConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            timeout: config.timeout,
        }
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect();
        format!(
            "{}/storage/v1/object/{bucket}/{}",
            self.base_url,
            encoded.join("/")
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get_by_path(&self, bucket: &str, path: &str) -> Result<StoredObject, StorageError> {
        let response = self
            .http
            .get(self.object_url(bucket, path))
            .timeout(self.timeout)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StorageError::Status {
                bucket: bucket.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }
}
