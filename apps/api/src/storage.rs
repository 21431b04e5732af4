//! File storage boundary: rendered reports live as objects under a key prefix
//! that plays the role of the reports "folder".

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("could not create link: {0}")]
    Link(String),
}

/// Upload, delete and link-out for stored report documents. The returned id is
/// opaque to callers and is what gets recorded on the report.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn delete(&self, file_id: &str) -> Result<(), StorageError>;

    /// A time-limited URL from which the stored file can be downloaded.
    async fn link(&self, file_id: &str) -> Result<String, StorageError>;
}

/// S3 / MinIO backed store. The object key is the file id.
#[derive(Clone)]
pub struct S3FileStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    link_ttl: Duration,
}

impl S3FileStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str, prefix: &str, link_ttl: Duration) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            link_ttl,
        }
    }
}

/// `{prefix}/{upload_id}/{filename}`. The upload id keeps two reports with the
/// same display filename from sharing an object.
pub fn object_key(prefix: &str, upload_id: Uuid, filename: &str) -> String {
    if prefix.is_empty() {
        format!("{upload_id}/{filename}")
    } else {
        format!("{prefix}/{upload_id}/{filename}")
    }
}

/// `attachment; filename="..."` with anything outside printable ASCII replaced.
pub fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = object_key(&self.prefix, Uuid::new_v4(), filename);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .content_disposition(attachment_disposition(filename))
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        info!("Uploaded report to s3://{}/{}", self.bucket, key);
        Ok(key)
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(file_id)
            .send()
            .await
            .map_err(|e| StorageError::Delete(e.to_string()))?;

        info!("Deleted s3://{}/{}", self.bucket, file_id);
        Ok(())
    }

    async fn link(&self, file_id: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(self.link_ttl)
            .map_err(|e| StorageError::Link(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(file_id)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Link(e.to_string()))?;
        Ok(request.uri().to_string())
    }
}
