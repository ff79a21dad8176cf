//! Two-legged (client credentials) token client for APS.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::ApsConfig;

use super::{AuthError, ScopeSet, TokenGrant, TokenSource};

/// Client-credentials token source backed by the APS authentication API.
pub struct ApsTokenClient {
    client: Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
}

impl ApsTokenClient {
    pub fn new(config: &ApsConfig) -> Result<Self, AuthError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(AuthError::ConfigurationError(
                "client_id and client_secret are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| AuthError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            client,
            auth_url: config.auth_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }
}

#[async_trait]
impl TokenSource for ApsTokenClient {
    async fn acquire_scoped(&self, scopes: &ScopeSet) -> Result<TokenGrant, AuthError> {
        let scope = scopes.to_scope_string();
        debug!("Requesting two-legged token: scope='{}'", scope);

        let params = [
            ("grant_type", "client_credentials"),
            ("scope", scope.as_str()),
        ];

        let response = self
            .client
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if status == 400 || status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::InvalidCredentials(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| AuthError::ParseError(e.to_string()))
    }

    fn name(&self) -> &str {
        "aps"
    }
}
