use async_trait::async_trait;
use thiserror::Error;

use super::types::{ScopeSet, TokenGrant};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid client credentials: {0}")]
    InvalidCredentials(String),

    #[error("Token endpoint returned no expiry")]
    MissingExpiry,

    #[error("Token endpoint error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Token endpoint unreachable: {0}")]
    ServiceUnavailable(String),

    #[error("Failed to parse token response: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Issues scoped access tokens (the remote half of the credential provider).
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Request a fresh token for exactly these scopes.
    async fn acquire_scoped(&self, scopes: &ScopeSet) -> Result<TokenGrant, AuthError>;

    /// Name of this token source
    fn name(&self) -> &str;
}
