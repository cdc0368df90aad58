//! CLI runner - executes commands

use crate::auth::AuthConfig;
use crate::changes::ChangeDetectionStore;
use crate::cli::commands::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::export::{ArchiveLayout, ExportReport, IncrementalExporter};
use crate::http::{HttpClient, HttpClientConfig, RateLimiterConfig};
use crate::inventory::{InventoryApi, InventoryClient};
use crate::output::ArchiveDestination;
use crate::retry::RetryPolicy;
use crate::state::OffsetStore;
use crate::store::{OpenSearchStore, SearchStore};
use crate::sync::{InfraEnvCache, SyncService, SyncWorker, SyncWorkerPool};
use crate::types::parse_order_key;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
    shutdown: watch::Receiver<bool>,
}

impl Runner {
    /// Create a new runner; `shutdown` flips to true on interrupt
    pub fn new(cli: Cli, shutdown: watch::Receiver<bool>) -> Self {
        Self { cli, shutdown }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<ExitCode> {
        let config = AppConfig::load(self.cli.config.as_deref())?;
        match &self.cli.command {
            Commands::Sync { once } => self.sync(&config, *once).await,
            Commands::Export { streams, batch } => self.export(&config, streams, *batch).await,
            Commands::Purge { until, dry_run } => {
                self.purge(&config, until.as_deref(), *dry_run).await
            }
            Commands::Validate => self.validate(&config),
        }
    }

    /// Run sync rounds until a stop condition
    async fn sync(&self, config: &AppConfig, once: bool) -> Result<ExitCode> {
        let inventory: Arc<dyn InventoryApi> = Arc::new(build_inventory(config)?);
        let changes = ChangeDetectionStore::new(build_search_store(config)?)
            .with_retry(config.search.retry.policy())
            .with_bulk_chunk_size(config.search.bulk_chunk_size);

        let worker = SyncWorker::new(
            Arc::clone(&inventory),
            changes,
            config.sync.worker_settings(&config.search.indices),
        )
        .with_cache(Arc::new(InfraEnvCache::new(
            config.sync.infra_env_cache_size,
        )));
        let pool = SyncWorkerPool::new(
            Arc::new(worker),
            config.sync.n_workers,
            self.shutdown.clone(),
        );
        let service = SyncService::new(
            inventory,
            pool,
            config.sync.supervisor_settings(),
            self.shutdown.clone(),
        );

        info!(
            workers = config.sync.n_workers,
            "Starting sync against {}",
            config.inventory.url
        );
        let reason = service.run(once).await;
        info!(?reason, "Sync stopped");

        if reason.wants_restart() {
            return Ok(ExitCode::FAILURE);
        }
        Ok(ExitCode::SUCCESS)
    }

    /// One export pass per selected stream
    async fn export(&self, config: &AppConfig, names: &[String], batch: bool) -> Result<ExitCode> {
        let streams = config.export.select_streams(names)?;
        let store = build_search_store(config)?;
        let offsets = OffsetStore::new(Arc::clone(&store), &config.search.offsets_index)
            .with_retry(config.search.retry.policy());
        let destination = ArchiveDestination::parse(&config.archive.destination)?
            .with_buffer_bytes(config.archive.upload_buffer_bytes);
        let layout = if batch {
            ArchiveLayout::Batch
        } else {
            config.export.layout
        };

        let exporter = IncrementalExporter::new(store, offsets, destination)
            .with_layout(layout)
            .with_chunk_size(config.export.chunk_size);

        let mut failed = 0;
        for result in exporter.export_all(&streams).await {
            match result {
                Ok(report) => self.output_message(&export_message(&report)),
                Err(e) => {
                    failed += 1;
                    self.output_message(&json!({
                        "type": "LOG",
                        "log": {"level": "ERROR", "message": e.to_string()}
                    }));
                }
            }
        }

        if failed > 0 {
            error!("{failed} of {} streams failed to export", streams.len());
            return Ok(ExitCode::FAILURE);
        }
        Ok(ExitCode::SUCCESS)
    }

    /// Retention purge of the archive destination
    async fn purge(&self, config: &AppConfig, until: Option<&str>, dry_run: bool) -> Result<ExitCode> {
        let until = purge_cutoff(until)?;
        let destination = ArchiveDestination::parse(&config.archive.destination)?;
        let report = destination.purge_before(until, dry_run).await?;

        self.output_message(&json!({
            "type": "PURGE",
            "purge": {
                "destination": config.archive.destination,
                "until": until.to_rfc3339(),
                "dry_run": report.dry_run,
                "matched": report.matched.len(),
                "deleted": report.deleted,
                "kept": report.kept,
            }
        }));
        Ok(ExitCode::SUCCESS)
    }

    /// Report the effective configuration without secrets
    fn validate(&self, config: &AppConfig) -> Result<ExitCode> {
        let streams: Vec<&str> = config
            .export
            .streams
            .iter()
            .map(|stream| stream.name.as_str())
            .collect();
        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Configuration is valid: {} workers, {} export streams",
                    config.sync.n_workers,
                    streams.len()
                ),
                "inventory": config.inventory.url,
                "search": config.search.url,
                "archive": config.archive.destination,
                "streams": streams,
            }
        }));
        Ok(ExitCode::SUCCESS)
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        println!("{}", serde_json::to_string(msg).unwrap_or_default());
    }
}

fn export_message(report: &ExportReport) -> Value {
    let objects: Vec<Value> = report
        .objects
        .iter()
        .map(|object| {
            json!({
                "location": object.location,
                "records": object.records,
                "bytes": object.bytes,
            })
        })
        .collect();
    json!({
        "type": "EXPORT",
        "export": {
            "stream": report.stream,
            "records": report.records,
            "offsets_saved": report.offsets_saved,
            "objects": objects,
        }
    })
}

/// Purge cut-off; a missing value means now
fn purge_cutoff(value: Option<&str>) -> Result<DateTime<Utc>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(Utc::now()),
        Some(raw) => parse_order_key(raw).ok_or_else(|| {
            Error::invalid_value("until", format!("{raw:?} is not a date (YYYY-MM-DD HH:MM:SS)"))
        }),
    }
}

/// Inventory client with the offline-token exchange when a token is set
fn build_inventory(config: &AppConfig) -> Result<InventoryClient> {
    let inventory = &config.inventory;
    let http_config = HttpClientConfig::builder()
        .base_url(&inventory.url)
        .timeout(Duration::from_secs(inventory.timeout_seconds))
        .retry(inventory.retry.policy())
        .rate_limit(RateLimiterConfig::new(
            inventory.requests_per_second,
            inventory.requests_per_second,
        ))
        .build();

    let auth = match &inventory.offline_token {
        Some(token) => AuthConfig::OfflineToken {
            token_url: inventory.token_url.clone(),
            client_id: inventory.client_id.clone(),
            offline_token: token.clone(),
        },
        None => {
            warn!("OFFLINE_TOKEN is not set, inventory requests are unauthenticated");
            AuthConfig::None
        }
    };
    Ok(InventoryClient::new(HttpClient::with_auth(http_config, auth)?))
}

/// OpenSearch store; retries are applied per scan and bulk by its callers
fn build_search_store(config: &AppConfig) -> Result<Arc<dyn SearchStore>> {
    let search = &config.search;
    let http_config = HttpClientConfig::builder()
        .base_url(&search.url)
        .timeout(Duration::from_secs(search.timeout_seconds))
        .retry(RetryPolicy::none())
        .no_rate_limit()
        .insecure(search.insecure)
        .build();
    let auth = AuthConfig::basic_if_present(search.username.clone(), search.password.clone());
    let http = HttpClient::with_auth(http_config, auth)?;
    Ok(Arc::new(OpenSearchStore::new(http)))
}
