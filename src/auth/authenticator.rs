//! Authenticator implementation
//!
//! Handles applying authentication to requests and managing token refresh.

use super::types::{AuthConfig, CachedToken};
use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Authenticator handles applying authentication to HTTP requests
pub struct Authenticator {
    /// Auth configuration
    config: AuthConfig,
    /// Cached access token for the offline-token exchange
    cached_token: Arc<RwLock<Option<CachedToken>>>,
    /// HTTP client for token requests
    http_client: Client,
}

impl Authenticator {
    /// Create a new authenticator with the given config
    pub fn new(config: AuthConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    /// Create an authenticator with a custom HTTP client
    pub fn with_client(config: AuthConfig, http_client: Client) -> Self {
        Self {
            config,
            cached_token: Arc::new(RwLock::new(None)),
            http_client,
        }
    }

    /// Apply authentication to a request builder
    pub async fn apply(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        match &self.config {
            AuthConfig::None => Ok(req),
            AuthConfig::Basic { username, password } => {
                Ok(req.basic_auth(username, Some(password)))
            }
            AuthConfig::Bearer { token } => Ok(req.bearer_auth(token)),
            AuthConfig::OfflineToken { .. } => {
                let token = self.get_or_refresh_token().await?;
                Ok(req.bearer_auth(token))
            }
        }
    }

    /// Drop the cached token so the next request exchanges a fresh one
    pub async fn invalidate(&self) {
        *self.cached_token.write().await = None;
    }

    /// Get a valid token, refreshing if necessary
    async fn get_or_refresh_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired() {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.cached_token.write().await;

        // Another task may have refreshed while we waited for the write lock
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }

        let new_token = self.fetch_new_token().await?;
        let token_str = new_token.token.clone();
        *cached = Some(new_token);

        Ok(token_str)
    }

    /// Exchange the offline token for an access token
    async fn fetch_new_token(&self) -> Result<CachedToken> {
        let AuthConfig::OfflineToken {
            token_url,
            client_id,
            offline_token,
        } = &self.config
        else {
            return Err(Error::auth(
                "Token refresh not supported for this auth type",
            ));
        };

        debug!("Exchanging offline token at {token_url}");
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id.as_str()),
            ("refresh_token", offline_token.as_str()),
        ];

        let response = self
            .http_client
            .post(token_url)
            .form(&form)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenRefresh {
                message: format!("Offline token exchange failed with status {status}: {body}"),
            });
        }

        let body = response.text().await.map_err(Error::Http)?;
        let token_response: TokenResponse = serde_json::from_str(&body)?;
        Ok(token_response.into_cached_token())
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.config {
            AuthConfig::None => "none",
            AuthConfig::Basic { .. } => "basic",
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::OfflineToken { .. } => "offline_token",
        };
        f.debug_struct("Authenticator")
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_cached_token(self) -> CachedToken {
        match self.expires_in {
            Some(secs) => CachedToken::expires_in(self.access_token, secs),
            None => CachedToken::new(self.access_token, None),
        }
    }
}
