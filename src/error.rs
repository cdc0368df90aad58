//! Error types for cluster-events-sync
//!
//! All public APIs return `Result<T, Error>` where Error is defined here.
//! Callers that need to branch on failure type use [`Error::kind`] rather
//! than matching individual variants.

use std::time::Duration;
use thiserror::Error;

/// The main error type
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Token refresh failed: {message}")]
    TokenRefresh { message: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Search Store Errors
    // ============================================================================
    #[error("Index '{index}' does not exist")]
    IndexNotFound { index: String },

    #[error("Document '{id}' already exists")]
    Conflict { id: String },

    #[error("Search store error: {message}")]
    Store { message: String },

    // ============================================================================
    // Offset Errors
    // ============================================================================
    #[error("Offset error: {message}")]
    State { message: String },

    // ============================================================================
    // Archive Errors
    // ============================================================================
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Output error: {message}")]
    Output { message: String },

    #[error("Export of stream '{stream}' failed: {message}")]
    Export { stream: String, message: String },

    // ============================================================================
    // Sync Errors
    // ============================================================================
    #[error("Cluster {cluster_id} rejected: {reason}")]
    Rejected { cluster_id: String, reason: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Coarse classification of an error, inspected by callers to decide
/// between retrying, substituting an empty result, or giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote resource does not exist (HTTP 404, missing index)
    NotFound,
    /// Network failure, timeout, throttling or 5xx; worth retrying
    Transient,
    /// Duplicate identity on insert
    Conflict,
    /// Business rule stopped processing (blacklist, host ceiling)
    Rejected,
    /// Anything else
    Permanent,
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a search store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create an output error
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Create an export error
    pub fn export(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Export {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create a business-rule rejection
    pub fn rejected(cluster_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            cluster_id: cluster_id.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::HttpStatus { status: 404, .. } | Error::IndexNotFound { .. } => {
                ErrorKind::NotFound
            }
            Error::HttpStatus { status: 409, .. } | Error::Conflict { .. } => ErrorKind::Conflict,
            Error::HttpStatus { status, .. } if is_retryable_status(*status) => {
                ErrorKind::Transient
            }
            Error::Http(e) if !e.is_decode() && !e.is_builder() => ErrorKind::Transient,
            Error::RateLimited { .. } | Error::Timeout { .. } => ErrorKind::Transient,
            Error::Rejected { .. } => ErrorKind::Rejected,
            _ => ErrorKind::Permanent,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Check if this error means "nothing there"
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// A 4xx response other than 404/409/429
    pub fn is_client_anomaly(&self) -> bool {
        matches!(self, Error::HttpStatus { status, .. }
            if (400..500).contains(status) && !matches!(status, 404 | 409 | 429))
    }

    /// Server-requested delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited {
                retry_after_seconds,
            } => Some(Duration::from_secs(*retry_after_seconds)),
            _ => None,
        }
    }
}

/// Check if an HTTP status code is retryable
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
