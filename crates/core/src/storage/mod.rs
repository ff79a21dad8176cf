//! Object storage: buckets, uploads and signed download links.
//!
//! `BlobStore` is the raw remote API; `ObjectResolver` binds it to one
//! configured bucket and the credential provider, and is what the rest of the
//! crate talks to.

mod oss;
mod resolver;
mod types;

pub use oss::OssClient;
pub use resolver::ObjectResolver;
pub use types::*;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::{AuthError, Credential};

/// Errors that can occur when talking to object storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Storage service returned an error.
    #[error("Storage API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Required local input does not exist.
    #[error("Missing artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Remote object storage operations. Every call except `download` carries a
/// bearer credential.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of this store implementation
    fn name(&self) -> &str;

    async fn bucket_exists(&self, credential: &Credential, bucket: &str)
        -> Result<bool, StorageError>;

    /// Create a bucket. Creating one that already exists is not an error.
    async fn create_bucket(
        &self,
        credential: &Credential,
        bucket: &str,
        region: &str,
        policy_key: &str,
    ) -> Result<(), StorageError>;

    /// Create the bucket when the existence check reports it missing.
    /// Returns whether it was created.
    async fn ensure_bucket(
        &self,
        credential: &Credential,
        bucket: &str,
        region: &str,
        policy_key: &str,
    ) -> Result<bool, StorageError> {
        if self.bucket_exists(credential, bucket).await? {
            return Ok(false);
        }
        self.create_bucket(credential, bucket, region, policy_key)
            .await?;
        Ok(true)
    }

    async fn list_buckets(&self, credential: &Credential) -> Result<Vec<BucketSummary>, StorageError>;

    async fn delete_bucket(&self, credential: &Credential, bucket: &str) -> Result<(), StorageError>;

    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<BlobReference, StorageError>;

    async fn head_exists(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
    ) -> Result<bool, StorageError>;

    /// Issue a read-only signed URL valid for `minutes`.
    async fn signed_download_url(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        minutes: u32,
        single_use: bool,
    ) -> Result<String, StorageError>;

    /// Fetch the content behind a signed (self-authorizing) URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError>;
}
