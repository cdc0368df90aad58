//! Application configuration
//!
//! Loaded from an optional YAML file, then overridden by environment
//! variables. Every field has a default so a bare environment is enough to
//! run against local services.

use crate::error::{Error, Result, ResultExt};
use crate::export::{ArchiveLayout, StreamDescriptor, DEFAULT_CHUNK_SIZE};
use crate::output::DEFAULT_UPLOAD_BUFFER_BYTES;
use crate::retry::RetryPolicy;
use crate::state::DEFAULT_OFFSET_INDEX;
use crate::sync::{
    SupervisorSettings, SyncIndices, VolatileFields, WorkerSettings, DEFAULT_CACHE_CAPACITY,
    DEFAULT_MAX_HOSTS, DEFAULT_WORKERS, MAX_EVENTS,
};
use crate::types::BackoffType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete configuration of both the sync service and the exporter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub inventory: InventoryConfig,
    pub search: SearchConfig,
    pub archive: ArchiveConfig,
    pub sync: SyncConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    /// Load a YAML file, apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without environment overrides or validation
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = var("ASSISTED_SERVICE_URL") {
            self.inventory.url = url;
        }
        if let Some(token) = var("OFFLINE_TOKEN") {
            self.inventory.offline_token = Some(token);
        }
        if let Some(url) = var("ES_SERVER") {
            self.search.url = url;
        }
        if let Some(user) = var("ES_USER") {
            self.search.username = Some(user);
        }
        if let Some(password) = var("ES_PASS") {
            self.search.password = Some(password);
        }
        if let Some(index) = var("ES_INDEX") {
            self.search.indices.clusters = index;
        }
        if let Some(index) = var("EVENT_STORE_EVENTS_IDX") {
            self.search.indices.events = index;
        }
        if let Some(index) = var("EVENT_STORE_CLUSTER_EVENTS_IDX") {
            self.search.indices.clusters = index;
        }
        if let Some(index) = var("EVENT_STORE_INFRA_ENVS_IDX") {
            self.search.indices.infra_envs = index;
        }
        if let Some(index) = var("EVENT_STORE_COMPONENT_VERSIONS_EVENTS_IDX") {
            self.search.indices.versions = index;
        }
        if let Some(workers) = var("N_WORKERS") {
            self.sync.n_workers = parse_number::<usize>("N_WORKERS", &workers)?.max(1);
        }
        if let Some(minutes) = var("MAX_IDLE_MINUTES") {
            self.sync.max_idle_minutes = parse_number("MAX_IDLE_MINUTES", &minutes)?;
        }
        if let Some(errors) = var("ERRORS_BEFORE_RESTART") {
            self.sync.errors_before_restart = parse_number("ERRORS_BEFORE_RESTART", &errors)?;
        }
        if let Some(key) = var("USER_HASH_KEY") {
            self.sync.user_hash_key = key;
        }
        if let Some(names) = var("CLUSTER_BLACKLIST") {
            self.sync.blacklist = names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(size) = var("EVENT_EXPORT_STREAM_CHUNK_SIZE") {
            self.export.chunk_size = parse_number("EVENT_EXPORT_STREAM_CHUNK_SIZE", &size)?;
        }
        if let Some(bucket) = var("AWS_S3_BUCKET") {
            let prefix = var("AWS_S3_PREFIX").unwrap_or_default();
            let destination = format!("s3://{bucket}/{}", prefix.trim_matches('/'));
            self.archive.destination = destination.trim_end_matches('/').to_string();
        }
        Ok(())
    }

    /// Reject values that can only fail later
    pub fn validate(&self) -> Result<()> {
        if self.inventory.url.trim().is_empty() {
            return Err(Error::missing_field("inventory.url"));
        }
        if self.search.url.trim().is_empty() {
            return Err(Error::missing_field("search.url"));
        }
        url::Url::parse(&self.inventory.url)?;
        url::Url::parse(&self.search.url)?;
        if self.archive.destination.trim().is_empty() {
            return Err(Error::missing_field("archive.destination"));
        }
        if self.sync.max_hosts == 0 {
            return Err(Error::invalid_value("sync.max_hosts", "must be at least 1"));
        }
        if self.export.chunk_size == 0 {
            return Err(Error::invalid_value("export.chunk_size", "must be at least 1"));
        }
        if self.search.bulk_chunk_size == 0 {
            return Err(Error::invalid_value(
                "search.bulk_chunk_size",
                "must be at least 1",
            ));
        }

        let mut names = std::collections::HashSet::new();
        for stream in &self.export.streams {
            if stream.name.is_empty() || stream.order_key.is_empty() {
                return Err(Error::invalid_value(
                    "export.streams",
                    "every stream needs a name and an order_key",
                ));
            }
            if !names.insert(stream.name.as_str()) {
                return Err(Error::invalid_value(
                    "export.streams",
                    format!("duplicate stream '{}'", stream.name),
                ));
            }
        }
        debug!("Configuration validated");
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::invalid_value(key, format!("'{value}': {e}")))
}

// ============================================================================
// Retry
// ============================================================================

/// Retry settings as written in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(rename = "type")]
    pub backoff_type: BackoffType,
    pub initial_ms: u64,
    pub max_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_type: BackoffType::Exponential,
            initial_ms: 1000,
            max_ms: 4000,
            jitter_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.max_retries)
            .with_backoff(
                self.backoff_type,
                Duration::from_millis(self.initial_ms),
                Duration::from_millis(self.max_ms),
            )
            .with_jitter(Duration::from_millis(self.jitter_ms))
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Inventory API access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// API root, e.g. `https://api.openshift.com/api/assisted-install`
    pub url: String,
    /// SSO token endpoint for the offline-token exchange
    pub token_url: String,
    pub client_id: String,
    /// Offline token; requests are unauthenticated without one
    pub offline_token: Option<String>,
    pub timeout_seconds: u64,
    pub requests_per_second: u32,
    pub retry: RetryConfig,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openshift.com/api/assisted-install".to_string(),
            token_url:
                "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token"
                    .to_string(),
            client_id: "cloud-services".to_string(),
            offline_token: None,
            timeout_seconds: 30,
            requests_per_second: 20,
            retry: RetryConfig::default(),
        }
    }
}

/// Search store access and index names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Accept self-signed certificates
    pub insecure: bool,
    pub timeout_seconds: u64,
    pub bulk_chunk_size: usize,
    pub offsets_index: String,
    pub indices: SyncIndices,
    /// Applied around whole scans and bulk submissions
    pub retry: RetryConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            insecure: false,
            timeout_seconds: 60,
            bulk_chunk_size: crate::changes::DEFAULT_BULK_CHUNK_SIZE,
            offsets_index: DEFAULT_OFFSET_INDEX.to_string(),
            indices: SyncIndices::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Where export objects go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// `s3://bucket/prefix`, `gs://…`, `az://…` or a local directory
    pub destination: String,
    pub upload_buffer_bytes: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            destination: "./archive".to_string(),
            upload_buffer_bytes: DEFAULT_UPLOAD_BUFFER_BYTES,
        }
    }
}

/// Sync rounds and supervision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub n_workers: usize,
    pub max_idle_minutes: u64,
    pub errors_before_restart: u64,
    pub round_interval_seconds: u64,
    pub max_hosts: usize,
    pub max_events: usize,
    pub infra_env_cache_size: usize,
    pub user_hash_key: String,
    /// Cluster names or ids never synced
    pub blacklist: Vec<String>,
    pub volatile_fields: VolatileFields,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            n_workers: DEFAULT_WORKERS,
            max_idle_minutes: 120,
            errors_before_restart: 100,
            round_interval_seconds: 60,
            max_hosts: DEFAULT_MAX_HOSTS,
            max_events: MAX_EVENTS,
            infra_env_cache_size: DEFAULT_CACHE_CAPACITY,
            user_hash_key: String::new(),
            blacklist: Vec::new(),
            volatile_fields: VolatileFields::default(),
        }
    }
}

impl SyncConfig {
    pub fn worker_settings(&self, indices: &SyncIndices) -> WorkerSettings {
        WorkerSettings {
            indices: indices.clone(),
            blacklist: self.blacklist.iter().cloned().collect(),
            max_hosts: self.max_hosts,
            max_events: self.max_events,
            user_hash_key: self.user_hash_key.clone(),
            volatile_fields: self.volatile_fields.clone(),
        }
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            max_idle: Duration::from_secs(self.max_idle_minutes.saturating_mul(60)),
            errors_before_restart: self.errors_before_restart,
            round_interval: Duration::from_secs(self.round_interval_seconds),
        }
    }
}

/// Export passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub chunk_size: usize,
    pub layout: ArchiveLayout,
    pub streams: Vec<StreamDescriptor>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            layout: ArchiveLayout::Daily,
            streams: default_streams(&SyncIndices::default()),
        }
    }
}

impl ExportConfig {
    /// Configured streams, or only the named ones
    pub fn select_streams(&self, names: &[String]) -> Result<Vec<StreamDescriptor>> {
        if names.is_empty() {
            return Ok(self.streams.clone());
        }
        names
            .iter()
            .map(|name| {
                self.streams
                    .iter()
                    .find(|stream| &stream.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        Error::invalid_value("stream", format!("unknown stream '{name}'"))
                    })
            })
            .collect()
    }
}

/// Streams exported by default, one per synced index
pub fn default_streams(indices: &SyncIndices) -> Vec<StreamDescriptor> {
    vec![
        StreamDescriptor::new(&indices.events, "event_time").partitioned_by("cluster_id"),
        StreamDescriptor::new(&indices.clusters, "updated_at").partitioned_by("id"),
        StreamDescriptor::new(&indices.infra_envs, "updated_at").partitioned_by("id"),
        StreamDescriptor::new(&indices.versions, "timestamp"),
    ]
}
