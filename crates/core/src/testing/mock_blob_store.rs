//! In-memory blob store for testing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::auth::Credential;
use crate::storage::{BlobReference, BlobStore, BucketSummary, StorageError};

const SIGNED_PREFIX: &str = "https://signed.test/";

/// Body returned for downloads of unknown URLs (work item reports).
pub const FALLBACK_BODY: &[u8] = b"mock report";

/// Mock implementation of the BlobStore trait.
///
/// Provides controllable behavior for testing:
/// - Buckets and objects live in memory
/// - Signed URLs resolve back to the stored object on download
/// - Arbitrary URLs can be given fixed download bodies
/// - Requests are counted, failures can be injected
///
/// # Example
///
/// ```rust,ignore
/// let store = MockBlobStore::new();
/// store.put_object("bucket", "final.pdf", b"%PDF".to_vec()).await;
///
/// let url = store.signed_download_url(&cred, "bucket", "final.pdf", 15, false).await?;
/// assert_eq!(store.download(&url).await?, b"%PDF");
/// ```
#[derive(Debug)]
pub struct MockBlobStore {
    buckets: Arc<RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>>,
    downloads: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    failing_deletes: Arc<RwLock<HashSet<String>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<StorageError>>>,
    requests: AtomicUsize,
    created: AtomicUsize,
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(RwLock::new(BTreeMap::new())),
            downloads: Arc::new(RwLock::new(HashMap::new())),
            failing_deletes: Arc::new(RwLock::new(HashSet::new())),
            next_error: Arc::new(RwLock::new(None)),
            requests: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
        }
    }

    /// URL handed out for `bucket/key`.
    pub fn signed_url_for(bucket: &str, key: &str) -> String {
        format!("{}{}/{}", SIGNED_PREFIX, bucket, key)
    }

    /// Total number of remote operations served.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of buckets created through `create_bucket`.
    pub fn created_bucket_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Bucket keys in sorted order.
    pub async fn buckets(&self) -> Vec<String> {
        self.buckets.read().await.keys().cloned().collect()
    }

    pub async fn add_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    /// Store an object directly, creating the bucket if needed.
    pub async fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), bytes);
    }

    /// Keys stored in `bucket`, sorted.
    pub async fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Serve `bytes` for downloads of `url`.
    pub async fn register_download(&self, url: &str, bytes: Vec<u8>) {
        self.downloads.write().await.insert(url.to_string(), bytes);
    }

    /// Make deletion of `bucket` fail.
    pub async fn fail_delete_for(&self, bucket: &str) {
        self.failing_deletes.write().await.insert(bucket.to_string());
    }

    pub async fn set_next_error(&self, error: StorageError) {
        *self.next_error.write().await = Some(error);
    }

    async fn begin(&self) -> Result<(), StorageError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn bucket_exists(&self, _credential: &Credential, bucket: &str) -> Result<bool, StorageError> {
        self.begin().await?;
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn create_bucket(
        &self,
        _credential: &Credential,
        bucket: &str,
        _region: &str,
        _policy_key: &str,
    ) -> Result<(), StorageError> {
        self.begin().await?;
        let mut buckets = self.buckets.write().await;
        if !buckets.contains_key(bucket) {
            buckets.insert(bucket.to_string(), BTreeMap::new());
            self.created.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn list_buckets(&self, _credential: &Credential) -> Result<Vec<BucketSummary>, StorageError> {
        self.begin().await?;
        Ok(self
            .buckets
            .read()
            .await
            .keys()
            .map(|key| BucketSummary {
                bucket_key: key.clone(),
                policy_key: Some("transient".to_string()),
                created_date: None,
            })
            .collect())
    }

    async fn delete_bucket(&self, _credential: &Credential, bucket: &str) -> Result<(), StorageError> {
        self.begin().await?;
        if self.failing_deletes.read().await.contains(bucket) {
            return Err(StorageError::ApiError {
                status: 403,
                message: format!("bucket {} is owned by another application", bucket),
            });
        }
        match self.buckets.write().await.remove(bucket) {
            Some(_) => Ok(()),
            None => Err(StorageError::BucketNotFound(bucket.to_string())),
        }
    }

    async fn put(
        &self,
        _credential: &Credential,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<BlobReference, StorageError> {
        self.begin().await?;
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        objects.insert(key.to_string(), bytes);
        Ok(BlobReference::new(bucket, key))
    }

    async fn head_exists(
        &self,
        _credential: &Credential,
        bucket: &str,
        key: &str,
    ) -> Result<bool, StorageError> {
        self.begin().await?;
        Ok(self.object(bucket, key).await.is_some())
    }

    async fn signed_download_url(
        &self,
        _credential: &Credential,
        bucket: &str,
        key: &str,
        _minutes: u32,
        _single_use: bool,
    ) -> Result<String, StorageError> {
        self.begin().await?;
        if self.object(bucket, key).await.is_none() {
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(Self::signed_url_for(bucket, key))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        self.begin().await?;
        if let Some(bytes) = self.downloads.read().await.get(url) {
            return Ok(bytes.clone());
        }
        if let Some((bucket, key)) = url
            .strip_prefix(SIGNED_PREFIX)
            .and_then(|path| path.split_once('/'))
        {
            return self.object(bucket, key).await.ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(FALLBACK_BODY.to_vec())
    }
}
