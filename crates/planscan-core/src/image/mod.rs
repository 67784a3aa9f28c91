//! Plan image acquisition.
//!
//! The primary path maps the image reference to an object in the plans
//! bucket and downloads it with service credentials. When that fails for any
//! reason, the reference is fetched as a public URL instead.

pub mod object_store;

use std::sync::Arc;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};
use url::Url;

pub use object_store::{HttpObjectStore, ObjectStore, StorageConfig, StorageError, StoredObject};

/// MIME type assumed when storage reports something that is not an image.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Image bytes held for the duration of one request.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageAsset {
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

impl std::fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAsset")
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

/// Why the storage download did not produce an image.
#[derive(Debug, thiserror::Error)]
pub enum StoragePathError {
    #[error("cannot map {image_ref:?} to a path in bucket {bucket:?}")]
    PathResolution { image_ref: String, bucket: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Why the public URL fetch did not produce an image.
#[derive(Debug, thiserror::Error)]
pub enum PublicFetchError {
    #[error("{0:?} is not an http(s) URL")]
    NotAUrl(String),

    #[error("image fetch returned status {0}")]
    Status(u16),

    #[error("invalid content type: {0:?}")]
    NotAnImage(Option<String>),

    #[error("image fetch failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Both retrieval paths failed.
#[derive(Debug, thiserror::Error)]
#[error("could not acquire plan image (storage: {primary}; public url: {fallback})")]
pub struct AcquisitionError {
    pub primary: StoragePathError,
    pub fallback: PublicFetchError,
}

/// Map an image reference to an object path inside `bucket`.
///
/// Accepts an absolute URL containing `/<bucket>/` (the remainder is
/// percent-decoded) or a bucket-relative `<bucket>/<path>` reference.
pub fn resolve_object_path(image_ref: &str, bucket: &str) -> Result<String, StoragePathError> {
    let unresolvable = || StoragePathError::PathResolution {
        image_ref: image_ref.to_string(),
        bucket: bucket.to_string(),
    };
    let marker = format!("/{bucket}/");

    let raw_path = match Url::parse(image_ref) {
        Ok(url) => {
            let path = url.path();
            let start = path.find(&marker).ok_or_else(unresolvable)?;
            let encoded = &path[start + marker.len()..];
            percent_decode_str(encoded)
                .decode_utf8()
                .map_err(|_| unresolvable())?
                .into_owned()
        }
        Err(_) => image_ref
            .trim_start_matches('/')
            .strip_prefix(&marker[1..])
            .ok_or_else(unresolvable)?
            .to_string(),
    };

    if raw_path.is_empty() || raw_path.ends_with('/') {
        return Err(unresolvable());
    }
    Ok(raw_path)
}

/// Media type without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Resolves image references to bytes.
#[derive(Clone)]
pub struct ImageAcquirer {
    store: Arc<dyn ObjectStore>,
    http: reqwest::Client,
    bucket: String,
    timeout: Duration,
}

impl ImageAcquirer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        http: reqwest::Client,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            http,
            bucket: bucket.into(),
            timeout,
        }
    }

    /// Fetch the image behind `image_ref`, from storage first and the public
    /// URL second.
    pub async fn acquire(&self, image_ref: &str) -> Result<ImageAsset, AcquisitionError> {
        match self.from_storage(image_ref).await {
            Ok(asset) => Ok(asset),
            Err(primary) => {
                warn!(image_ref, error = %primary, "storage download failed; trying public URL");
                self.from_public_url(image_ref)
                    .await
                    .map_err(|fallback| AcquisitionError { primary, fallback })
            }
        }
    }

    async fn from_storage(&self, image_ref: &str) -> Result<ImageAsset, StoragePathError> {
        let path = resolve_object_path(image_ref, &self.bucket)?;
        debug!(bucket = %self.bucket, path = %path, "downloading plan from storage");

        let object = self.store.get_by_path(&self.bucket, &path).await?;
        let mime_type = object
            .content_type
            .as_deref()
            .map(essence)
            .filter(|m| m.starts_with("image/"))
            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());

        Ok(ImageAsset {
            bytes: object.bytes,
            mime_type,
        })
    }

    async fn from_public_url(&self, image_ref: &str) -> Result<ImageAsset, PublicFetchError> {
        let url = Url::parse(image_ref)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| PublicFetchError::NotAUrl(image_ref.to_string()))?;

        let response = self.http.get(url).timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublicFetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mime_type = match content_type.as_deref().map(essence) {
            Some(m) if m.starts_with("image/") => m,
            _ => return Err(PublicFetchError::NotAnImage(content_type)),
        };

        let bytes = response.bytes().await?.to_vec();
        Ok(ImageAsset { bytes, mime_type })
    }
}
