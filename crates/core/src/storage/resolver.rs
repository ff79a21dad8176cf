//! Binds a `BlobStore` to the configured bucket.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::auth::CredentialProvider;
use crate::config::StorageConfig;

use super::{BlobReference, BlobStore, StorageError};

/// Uploads local artifacts and hands out references and signed links for
/// objects in one bucket.
pub struct ObjectResolver {
    store: Arc<dyn BlobStore>,
    credentials: Arc<CredentialProvider>,
    config: StorageConfig,
}

impl ObjectResolver {
    pub fn new(
        store: Arc<dyn BlobStore>,
        credentials: Arc<CredentialProvider>,
        config: StorageConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            config,
        }
    }

    pub fn bucket_key(&self) -> &str {
        &self.config.bucket_key
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Create the bucket if the service reports it missing.
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        let credential = self.credentials.internal().await?;
        let created = self
            .store
            .ensure_bucket(
                &credential,
                &self.config.bucket_key,
                &self.config.region,
                &self.config.policy_key,
            )
            .await?;
        if created {
            info!("Created bucket '{}'", self.config.bucket_key);
        }
        Ok(())
    }

    /// Fail with `MissingArtifact` for the first path that is not a file.
    /// Touches only the local filesystem.
    pub fn check_artifacts<'a>(
        paths: impl IntoIterator<Item = &'a Path>,
    ) -> Result<(), StorageError> {
        for path in paths {
            if !path.is_file() {
                return Err(StorageError::MissingArtifact(path.to_path_buf()));
            }
        }
        Ok(())
    }

    /// Upload a local file under `key`.
    pub async fn upload_file(&self, path: &Path, key: &str) -> Result<BlobReference, StorageError> {
        Self::check_artifacts([path])?;
        let bytes = tokio::fs::read(path).await?;
        let credential = self.credentials.internal().await?;
        let reference = self
            .store
            .put(&credential, &self.config.bucket_key, key, bytes)
            .await?;
        debug!("Uploaded {} as {}", path.display(), reference.object_id);
        Ok(reference)
    }

    /// Reserve `key` by storing an empty object, so a work item can publish
    /// into it.
    pub async fn reserve(&self, key: &str) -> Result<BlobReference, StorageError> {
        let placeholder = NamedTempFile::new()?;
        self.upload_file(placeholder.path(), key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let credential = self.credentials.internal().await?;
        self.store
            .head_exists(&credential, &self.config.bucket_key, key)
            .await
    }

    /// Signed read link for `key`; the object must exist.
    pub async fn signed_url(&self, key: &str) -> Result<String, StorageError> {
        let credential = self.credentials.internal().await?;
        let bucket = &self.config.bucket_key;

        if !self.store.head_exists(&credential, bucket, key).await? {
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.clone(),
                key: key.to_string(),
            });
        }

        self.store
            .signed_download_url(
                &credential,
                bucket,
                key,
                self.config.signed_url_minutes,
                self.config.single_use,
            )
            .await
    }

    /// Download `url` into `dest`. Content is staged in a temp file in the
    /// destination directory and only moved into place once complete.
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<PathBuf, StorageError> {
        let bytes = self.store.download(url).await?;
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir).await?;

        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<PathBuf, StorageError> {
            let mut staged = NamedTempFile::new_in(&dir)?;
            staged.write_all(&bytes)?;
            staged.persist(&dest).map_err(|e| StorageError::Io(e.error))?;
            Ok(dest)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }

    /// Delete every bucket visible to the application. Buckets that fail to
    /// delete are skipped. Returns the deleted keys.
    pub async fn purge_buckets(&self) -> Result<Vec<String>, StorageError> {
        let credential = self.credentials.admin().await?;
        let buckets = self.store.list_buckets(&credential).await?;
        let mut deleted = Vec::with_capacity(buckets.len());

        for bucket in buckets {
            match self.store.delete_bucket(&credential, &bucket.bucket_key).await {
                Ok(()) => {
                    info!("Deleted bucket '{}'", bucket.bucket_key);
                    deleted.push(bucket.bucket_key);
                }
                Err(e) => warn!("Skipping bucket '{}': {}", bucket.bucket_key, e),
            }
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBlobStore, MockTokenSource};
    use tempfile::TempDir;

    fn resolver(store: Arc<MockBlobStore>) -> ObjectResolver {
        let credentials = Arc::new(CredentialProvider::new(Arc::new(MockTokenSource::new())));
        let config = StorageConfig {
            bucket_key: "test-bucket".to_string(),
            ..StorageConfig::default()
        };
        ObjectResolver::new(store, credentials, config)
    }

    #[tokio::test]
    async fn test_ensure_bucket_creates_once() {
        let store = Arc::new(MockBlobStore::new());
        let resolver = resolver(store.clone());

        resolver.ensure_bucket().await.unwrap();
        resolver.ensure_bucket().await.unwrap();

        assert_eq!(store.buckets().await, vec!["test-bucket".to_string()]);
        assert_eq!(store.created_bucket_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_missing_file_makes_no_request() {
        let store = Arc::new(MockBlobStore::new());
        let resolver = resolver(store.clone());

        let result = resolver
            .upload_file(Path::new("/definitely/not/here.dwg"), "here.dwg")
            .await;

        assert!(matches!(result, Err(StorageError::MissingArtifact(_))));
        assert_eq!(store.request_count(), 0);
    }

    #[tokio::test]
    async fn test_reserve_stores_empty_object() {
        let store = Arc::new(MockBlobStore::new());
        let resolver = resolver(store.clone());
        resolver.ensure_bucket().await.unwrap();

        let reference = resolver.reserve("final.pdf").await.unwrap();

        assert_eq!(reference.object_key, "final.pdf");
        assert_eq!(
            store.object("test-bucket", "final.pdf").await,
            Some(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_signed_url_requires_existing_object() {
        let store = Arc::new(MockBlobStore::new());
        let resolver = resolver(store.clone());
        resolver.ensure_bucket().await.unwrap();

        let missing = resolver.signed_url("final.pdf").await;
        assert!(matches!(missing, Err(StorageError::ObjectNotFound { .. })));

        resolver.reserve("final.pdf").await.unwrap();
        let url = resolver.signed_url("final.pdf").await.unwrap();
        assert!(!url.is_empty());
    }

    #[tokio::test]
    async fn test_download_to_writes_file() {
        let store = Arc::new(MockBlobStore::new());
        let resolver = resolver(store.clone());
        let dir = TempDir::new().unwrap();
        store
            .register_download("https://signed.test/final.pdf", b"%PDF-1.7".to_vec())
            .await;

        let path = resolver
            .download_to("https://signed.test/final.pdf", &dir.path().join("out/final.pdf"))
            .await
            .unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_purge_skips_failures() {
        let store = Arc::new(MockBlobStore::new());
        store.add_bucket("a").await;
        store.add_bucket("b").await;
        store.fail_delete_for("a").await;
        let resolver = resolver(store.clone());

        let deleted = resolver.purge_buckets().await.unwrap();

        assert_eq!(deleted, vec!["b".to_string()]);
        assert_eq!(store.buckets().await, vec!["a".to_string()]);
    }
}
