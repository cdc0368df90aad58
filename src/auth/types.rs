//! Auth configuration types

use chrono::{DateTime, Utc};

/// Authentication configuration
#[derive(Debug, Clone, Default)]
pub enum AuthConfig {
    /// No authentication required
    #[default]
    None,

    /// HTTP Basic authentication
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },

    /// Static bearer token
    Bearer {
        /// The bearer token
        token: String,
    },

    /// Long-lived offline token exchanged for short-lived access tokens
    /// through an OAuth2 refresh-token grant
    OfflineToken {
        /// Token endpoint URL
        token_url: String,
        /// Public client ID registered with the SSO
        client_id: String,
        /// The offline (refresh) token
        offline_token: String,
    },
}

impl AuthConfig {
    /// Basic auth when a username is configured, none otherwise
    pub fn basic_if_present(username: Option<String>, password: Option<String>) -> Self {
        match username {
            Some(username) if !username.is_empty() => AuthConfig::Basic {
                username,
                password: password.unwrap_or_default(),
            },
            _ => AuthConfig::None,
        }
    }
}

/// Cached token with expiration
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The access token
    pub token: String,
    /// When the token expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a new cached token
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Create a token that expires in N seconds from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        let expires_at = Utc::now() + chrono::Duration::seconds(seconds);
        Self {
            token,
            expires_at: Some(expires_at),
        }
    }

    /// Check if the token is expired (with 30 second buffer)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let buffer = chrono::Duration::seconds(30);
                Utc::now() + buffer >= expires_at
            }
            None => false,
        }
    }
}
