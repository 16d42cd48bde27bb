use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::time::Duration;

/// Binary object storage for uploaded images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Time-limited URL for downloading `key` directly from the bucket.
    async fn presigned_get(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;
}

/// Client for an S3-compatible bucket (R2, MinIO, S3).
pub struct BucketClient {
    bucket: Box<Bucket>,
}

impl BucketClient {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket })
    }
}

fn check_status(key: &str, status: u16) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        code => Err(StorageError::Status(code)),
    }
}

#[async_trait]
impl ObjectStore for BucketClient {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await?;
        check_status(key, response.status_code())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await?;
        check_status(key, response.status_code())?;
        Ok(response.to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self.bucket.delete_object(key).await?;
        // Missing objects count as deleted.
        match response.status_code() {
            404 => Ok(()),
            code => check_status(key, code),
        }
    }

    async fn presigned_get(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        let secs = u32::try_from(expires_in.as_secs()).unwrap_or(u32::MAX);
        Ok(self.bucket.presign_get(key, secs, None).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage returned HTTP {0}")]
    Status(u16),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
