//! Durable object storage for ingested videos.
//!
//! The uploader hands a finished local file to S3 (or an S3-compatible
//! endpoint) under a computed key. Whole-object visibility is the store's own
//! guarantee; nothing here re-implements atomicity.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{Client, config::Region, primitives::ByteStream};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not read `{path}` for upload: {reason}")]
    Read { path: String, reason: String },
    #[error("upload of `{key}` failed: {reason}")]
    Upload { key: String, reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Pushes local files into a durable object store.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload the file at `path` under `key`, tagged with `content_type`.
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;
}

/// `ObjectStorage` backed by an S3 bucket.
///
/// Credentials come from the SDK's default provider chain. A custom endpoint
/// switches the client to path-style addressing for S3-compatible providers.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(bucket: String, region: String, endpoint_url: Option<String>) -> Self {
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&base);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        debug!("uploading {} as {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|err| StorageError::Read {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| StorageError::Upload {
                key: key.to_string(),
                reason: err.to_string(),
            })?;

        info!("uploaded {} to {}/{}", path.display(), self.bucket, key);
        Ok(())
    }
}
