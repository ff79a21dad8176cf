use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single APS OAuth scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    DataRead,
    DataWrite,
    DataCreate,
    DataSearch,
    BucketCreate,
    BucketRead,
    BucketUpdate,
    BucketDelete,
    CodeAll,
}

impl Scope {
    /// Wire representation used in token requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::DataRead => "data:read",
            Scope::DataWrite => "data:write",
            Scope::DataCreate => "data:create",
            Scope::DataSearch => "data:search",
            Scope::BucketCreate => "bucket:create",
            Scope::BucketRead => "bucket:read",
            Scope::BucketUpdate => "bucket:update",
            Scope::BucketDelete => "bucket:delete",
            Scope::CodeAll => "code:all",
        }
    }
}

/// An unordered set of scopes; the credential cache is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    pub fn new(scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self(scopes.into_iter().collect())
    }

    /// Read-write scope for storage and Design Automation calls.
    pub fn internal() -> Self {
        Self::new([
            Scope::BucketCreate,
            Scope::BucketRead,
            Scope::DataRead,
            Scope::DataWrite,
            Scope::DataCreate,
            Scope::CodeAll,
        ])
    }

    /// Scope required to enumerate and delete buckets.
    pub fn admin() -> Self {
        Self::new([
            Scope::BucketCreate,
            Scope::BucketRead,
            Scope::BucketDelete,
            Scope::BucketUpdate,
            Scope::DataRead,
            Scope::DataWrite,
            Scope::DataCreate,
            Scope::DataSearch,
        ])
    }

    pub fn contains(&self, scope: Scope) -> bool {
        self.0.contains(&scope)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Space separated, as the token endpoint expects.
    pub fn to_scope_string(&self) -> String {
        self.0
            .iter()
            .map(Scope::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_scope_string())
    }
}

/// A bearer credential. Replaced wholesale on refresh, never mutated.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Raw answer of a token endpoint, before expiry validation.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_scope_set_is_order_independent() {
        let a = ScopeSet::new([Scope::DataRead, Scope::BucketRead]);
        let b = ScopeSet::new([Scope::BucketRead, Scope::DataRead, Scope::DataRead]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.to_scope_string(), "data:read bucket:read");
    }

    #[test]
    fn test_internal_and_admin_scope_sets_differ() {
        assert_ne!(ScopeSet::internal(), ScopeSet::admin());
        assert!(ScopeSet::internal().contains(Scope::CodeAll));
        assert!(ScopeSet::admin().contains(Scope::BucketDelete));
        assert!(!ScopeSet::internal().contains(Scope::BucketDelete));
    }

    #[test]
    fn test_credential_expiry_boundary() {
        let now = Utc::now();
        let credential = Credential::new("tok", now + Duration::seconds(60));
        assert!(!credential.is_expired_at(now));
        assert!(credential.is_expired_at(now + Duration::seconds(60)));
        assert_eq!(credential.bearer(), "Bearer tok");
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = Credential::new("super-secret", Utc::now());
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_token_grant_without_expiry() {
        let grant: TokenGrant = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(grant.access_token, "abc");
        assert!(grant.expires_in.is_none());
    }
}
