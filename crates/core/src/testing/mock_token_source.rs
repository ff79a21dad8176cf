//! Mock token source for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::auth::{AuthError, ScopeSet, TokenGrant, TokenSource};

/// Mock implementation of the TokenSource trait.
///
/// Every call issues a distinct token (`mock-token-<n>`), so tests can tell
/// a cached credential from a refreshed one.
#[derive(Debug)]
pub struct MockTokenSource {
    calls: AtomicUsize,
    /// Lifetime reported with each token; `None` simulates a missing expiry.
    expires_in: Arc<RwLock<Option<u64>>>,
    /// If set, the next request will fail with this error.
    next_error: Arc<RwLock<Option<AuthError>>>,
    requested: Arc<RwLock<Vec<ScopeSet>>>,
}

impl Default for MockTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTokenSource {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            expires_in: Arc::new(RwLock::new(Some(3600))),
            next_error: Arc::new(RwLock::new(None)),
            requested: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Number of token requests made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn set_expires_in(&self, expires_in: Option<u64>) {
        *self.expires_in.write().await = expires_in;
    }

    pub async fn set_next_error(&self, error: AuthError) {
        *self.next_error.write().await = Some(error);
    }

    /// Scope sets requested, in call order.
    pub async fn requested_scopes(&self) -> Vec<ScopeSet> {
        self.requested.read().await.clone()
    }
}

#[async_trait]
impl TokenSource for MockTokenSource {
    async fn acquire_scoped(&self, scopes: &ScopeSet) -> Result<TokenGrant, AuthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requested.write().await.push(scopes.clone());

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        Ok(TokenGrant {
            access_token: format!("mock-token-{}", call),
            expires_in: *self.expires_in.read().await,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
