//! Expiry-checked credential cache, one slot per scope set.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{AuthError, Credential, ScopeSet, TokenSource};

/// Hands out bearer credentials, refreshing a scope set's slot once it expires.
///
/// The lock is never held across the token request: callers racing on an
/// expired slot may each refresh, and the last write wins.
pub struct CredentialProvider {
    source: Arc<dyn TokenSource>,
    cache: RwLock<HashMap<ScopeSet, Credential>>,
}

impl CredentialProvider {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get a valid credential for `scopes`, fetching a new one if needed.
    pub async fn credential(&self, scopes: &ScopeSet) -> Result<Credential, AuthError> {
        if let Some(cached) = self.cache.read().await.get(scopes) {
            if !cached.is_expired_at(Utc::now()) {
                return Ok(cached.clone());
            }
        }

        debug!("Refreshing credential via {}: scope='{}'", self.source.name(), scopes);
        let grant = self.source.acquire_scoped(scopes).await?;
        let expires_in = grant.expires_in.ok_or(AuthError::MissingExpiry)?;
        // Lifetimes past chrono's range never expire.
        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let credential = Credential::new(grant.access_token, expires_at);

        self.cache
            .write()
            .await
            .insert(scopes.clone(), credential.clone());

        Ok(credential)
    }

    /// Read-write credential used for storage and work item calls.
    pub async fn internal(&self) -> Result<Credential, AuthError> {
        self.credential(&ScopeSet::internal()).await
    }

    /// Credential allowed to delete buckets.
    pub async fn admin(&self) -> Result<Credential, AuthError> {
        self.credential(&ScopeSet::admin()).await
    }

    /// Drop the cached slot so the next call refetches.
    pub async fn invalidate(&self, scopes: &ScopeSet) {
        self.cache.write().await.remove(scopes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTokenSource;

    #[tokio::test]
    async fn test_cached_within_validity_window() {
        let source = Arc::new(MockTokenSource::new());
        let provider = CredentialProvider::new(source.clone());

        let first = provider.internal().await.unwrap();
        let second = provider.internal().await.unwrap();

        assert_eq!(first.access_token(), second.access_token());
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_credential_refreshes_once() {
        let source = Arc::new(MockTokenSource::new());
        source.set_expires_in(Some(0)).await;
        let provider = CredentialProvider::new(source.clone());

        let first = provider.internal().await.unwrap();
        source.set_expires_in(Some(3600)).await;
        let second = provider.internal().await.unwrap();
        let third = provider.internal().await.unwrap();

        assert_ne!(first.access_token(), second.access_token());
        assert_eq!(second.access_token(), third.access_token());
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_distinct_scope_sets_have_distinct_slots() {
        let source = Arc::new(MockTokenSource::new());
        let provider = CredentialProvider::new(source.clone());

        let internal = provider.internal().await.unwrap();
        let admin = provider.admin().await.unwrap();
        provider.internal().await.unwrap();
        provider.admin().await.unwrap();

        assert_ne!(internal.access_token(), admin.access_token());
        assert_eq!(source.call_count(), 2);
        assert_eq!(
            source.requested_scopes().await,
            vec![ScopeSet::internal(), ScopeSet::admin()]
        );
    }

    #[tokio::test]
    async fn test_missing_expiry_is_auth_failure() {
        let source = Arc::new(MockTokenSource::new());
        source.set_expires_in(None).await;
        let provider = CredentialProvider::new(source);

        let result = provider.internal().await;
        assert!(matches!(result, Err(AuthError::MissingExpiry)));
    }

    #[tokio::test]
    async fn test_huge_expiry_is_clamped_not_overflowed() {
        let source = Arc::new(MockTokenSource::new());
        source.set_expires_in(Some(u64::MAX)).await;
        let provider = CredentialProvider::new(source.clone());

        let first = provider.internal().await.unwrap();
        let second = provider.internal().await.unwrap();

        assert!(!first.is_expired_at(Utc::now()));
        assert_eq!(first.access_token(), second.access_token());
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_source_error_propagates_and_nothing_is_cached() {
        let source = Arc::new(MockTokenSource::new());
        source
            .set_next_error(AuthError::InvalidCredentials("bad secret".to_string()))
            .await;
        let provider = CredentialProvider::new(source.clone());

        assert!(matches!(
            provider.internal().await,
            Err(AuthError::InvalidCredentials(_))
        ));
        assert!(provider.internal().await.is_ok());
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let source = Arc::new(MockTokenSource::new());
        let provider = CredentialProvider::new(source.clone());

        provider.internal().await.unwrap();
        provider.invalidate(&ScopeSet::internal()).await;
        provider.internal().await.unwrap();

        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_the_slot() {
        let source = Arc::new(MockTokenSource::new());
        let provider = Arc::new(CredentialProvider::new(source.clone()));
        provider.internal().await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.internal().await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(source.call_count(), 1);
    }
}
