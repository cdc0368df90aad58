//! Per-cluster unit of work

use super::cache::InfraEnvCache;
use super::checksum::{cluster_state_id, content_hash, event_id, VolatileFields, STATE_ID_FIELD};
use super::health::{ErrorCounter, ErrorSink, Liveness};
use super::normalize::{anonymize_cluster, cluster_document, event_document};
use crate::changes::{ChangeDetectionStore, ChangeSet, StoreReport};
use crate::error::{Error, ErrorKind, Result};
use crate::inventory::{ClusterRecord, InfraEnvRecord, InventoryApi, EVENT_CATEGORIES};
use crate::store::Query;
use crate::types::{get_path_string, JsonValue};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Events stored per cluster and round
pub const MAX_EVENTS: usize = 5000;

/// Hosts a cluster may have before it is rejected
pub const DEFAULT_MAX_HOSTS: usize = 1000;

// ============================================================================
// Settings
// ============================================================================

/// Target indices of a sync round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncIndices {
    pub clusters: String,
    pub events: String,
    pub infra_envs: String,
    pub versions: String,
}

impl Default for SyncIndices {
    fn default() -> Self {
        Self {
            clusters: ".clusters".to_string(),
            events: ".events".to_string(),
            infra_envs: ".infra_envs".to_string(),
            versions: ".component_versions".to_string(),
        }
    }
}

/// Worker behaviour
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub indices: SyncIndices,
    /// Cluster names (or ids) never synced
    pub blacklist: HashSet<String>,
    pub max_hosts: usize,
    pub max_events: usize,
    /// Key of the user-name hash
    pub user_hash_key: String,
    pub volatile_fields: VolatileFields,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            indices: SyncIndices::default(),
            blacklist: HashSet::new(),
            max_hosts: DEFAULT_MAX_HOSTS,
            max_events: MAX_EVENTS,
            user_hash_key: String::new(),
            volatile_fields: VolatileFields::default(),
        }
    }
}

// ============================================================================
// Work items
// ============================================================================

/// Processing state of one cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    Queued,
    Fetching,
    Enriching,
    ChecksumComputed,
    Persisted,
    Rejected,
    Failed,
}

impl WorkState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkState::Persisted | WorkState::Rejected | WorkState::Failed)
    }
}

/// One cluster queued for a round
#[derive(Debug)]
pub struct WorkItem {
    pub cluster: ClusterRecord,
    pub state: WorkState,
}

impl WorkItem {
    pub fn new(cluster: ClusterRecord) -> Self {
        Self {
            cluster,
            state: WorkState::Queued,
        }
    }

    fn advance(&mut self, state: WorkState) {
        debug!(cluster_id = %self.cluster.id, from = ?self.state, to = ?state, "Work item transition");
        self.state = state;
    }
}

/// Result of processing one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Persisted { cluster_id: String, state_id: String },
    Rejected { cluster_id: String, reason: String },
    Failed { cluster_id: String, error: String },
}

/// What each index received for one cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub infra_envs: StoreReport,
    pub cluster: StoreReport,
    pub events: StoreReport,
    pub versions: StoreReport,
}

// ============================================================================
// Worker
// ============================================================================

/// Fetches, enriches and persists one cluster at a time
pub struct SyncWorker {
    inventory: Arc<dyn InventoryApi>,
    changes: ChangeDetectionStore,
    infra_envs: Arc<InfraEnvCache>,
    settings: WorkerSettings,
    errors: Arc<ErrorCounter>,
    liveness: Arc<Liveness>,
    error_sink: Option<Arc<dyn ErrorSink>>,
}

impl SyncWorker {
    pub fn new(
        inventory: Arc<dyn InventoryApi>,
        changes: ChangeDetectionStore,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            inventory,
            changes,
            infra_envs: Arc::new(InfraEnvCache::default()),
            settings,
            errors: Arc::new(ErrorCounter::new()),
            liveness: Arc::new(Liveness::new()),
            error_sink: None,
        }
    }

    /// Share an infra-env cache
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<InfraEnvCache>) -> Self {
        self.infra_envs = cache;
        self
    }

    /// Share health signals with a supervisor
    #[must_use]
    pub fn with_health(mut self, errors: Arc<ErrorCounter>, liveness: Arc<Liveness>) -> Self {
        self.errors = errors;
        self.liveness = liveness;
        self
    }

    /// Report unexpected failures to an external sink
    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn errors(&self) -> &Arc<ErrorCounter> {
        &self.errors
    }

    pub fn liveness(&self) -> &Arc<Liveness> {
        &self.liveness
    }

    pub fn cache(&self) -> &Arc<InfraEnvCache> {
        &self.infra_envs
    }

    /// Sync one cluster.
    ///
    /// Never fails: rejections are logged as warnings, anything unexpected
    /// is counted, reported to the error sink and logged.
    pub async fn store_events_for_cluster(&self, cluster: ClusterRecord) -> WorkOutcome {
        let cluster_id = cluster.id.clone();
        let mut item = WorkItem::new(cluster);

        match self.process(&mut item).await {
            Ok(state_id) => WorkOutcome::Persisted {
                cluster_id,
                state_id,
            },
            Err(e) if e.kind() == ErrorKind::Rejected => {
                item.advance(WorkState::Rejected);
                warn!(cluster_id = %cluster_id, "Skipping cluster: {e}");
                WorkOutcome::Rejected {
                    cluster_id,
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                item.advance(WorkState::Failed);
                self.errors.inc();
                if let Some(sink) = &self.error_sink {
                    sink.report(&cluster_id, &e);
                }
                error!(cluster_id = %cluster_id, "Error while processing cluster: {e}");
                WorkOutcome::Failed {
                    cluster_id,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn process(&self, item: &mut WorkItem) -> Result<String> {
        let cluster_id = item.cluster.id.clone();
        self.check_blacklist(&item.cluster)?;
        anonymize_cluster(&mut item.cluster, self.settings.user_hash_key.as_bytes())?;

        item.advance(WorkState::Fetching);
        if item.cluster.hosts.is_empty() {
            item.cluster.hosts = or_empty(
                self.inventory.get_cluster_hosts(&cluster_id).await,
                "hosts",
                &cluster_id,
            )?;
        }
        if item.cluster.hosts.len() > self.settings.max_hosts {
            return Err(Error::rejected(
                &cluster_id,
                format!(
                    "{} hosts exceed the limit of {}",
                    item.cluster.hosts.len(),
                    self.settings.max_hosts
                ),
            ));
        }

        let mut events = or_empty(
            self.inventory.get_events(&cluster_id, EVENT_CATEGORIES).await,
            "events",
            &cluster_id,
        )?;
        if events.len() > self.settings.max_events {
            info!(
                cluster_id = %cluster_id,
                "Cluster has {} events, storing only {}",
                events.len(),
                self.settings.max_events
            );
            events.truncate(self.settings.max_events);
        }
        let versions = or_empty(self.inventory.get_versions().await, "versions", &cluster_id)?;
        let infra_envs = self.fetch_infra_envs(&item.cluster).await?;

        item.advance(WorkState::Enriching);
        let mut cluster_doc = cluster_document(&item.cluster, &infra_envs)?;
        let event_docs = events
            .iter()
            .map(|event| event_document(event, &cluster_id))
            .collect::<Result<Vec<_>>>()?;
        let infra_env_docs = infra_envs
            .values()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let state_id = cluster_state_id(&cluster_doc, &self.settings.volatile_fields);
        if let Some(object) = cluster_doc.as_object_mut() {
            object.insert(STATE_ID_FIELD.to_string(), JsonValue::String(state_id.clone()));
        }
        item.advance(WorkState::ChecksumComputed);

        let versions_doc = (!versions.is_empty())
            .then(|| serde_json::to_value(&versions))
            .transpose()?;
        let report = self
            .persist(&cluster_id, infra_env_docs, cluster_doc, event_docs, versions_doc)
            .await;
        debug!(cluster_id = %cluster_id, ?report, "Cluster persisted");

        item.advance(WorkState::Persisted);
        self.liveness.set_changed();
        Ok(state_id)
    }

    fn check_blacklist(&self, cluster: &ClusterRecord) -> Result<()> {
        let listed = self.settings.blacklist.contains(&cluster.id)
            || cluster
                .name
                .as_ref()
                .is_some_and(|name| self.settings.blacklist.contains(name));
        if listed {
            return Err(Error::rejected(&cluster.id, "cluster is blacklisted"));
        }
        Ok(())
    }

    /// Infra envs referenced by the cluster's hosts, through the cache
    async fn fetch_infra_envs(
        &self,
        cluster: &ClusterRecord,
    ) -> Result<HashMap<String, InfraEnvRecord>> {
        let mut found = HashMap::new();
        for id in cluster.infra_env_ids() {
            let result = self
                .infra_envs
                .get_or_fetch(&id, self.inventory.as_ref())
                .await
                .map(Some);
            if let Some(record) = or_empty(result, "infra env", &cluster.id)? {
                found.insert(id, record);
            }
        }
        Ok(found)
    }

    async fn persist(
        &self,
        cluster_id: &str,
        infra_envs: Vec<JsonValue>,
        cluster: JsonValue,
        events: Vec<JsonValue>,
        versions: Option<JsonValue>,
    ) -> PersistReport {
        let indices = &self.settings.indices;
        let mut report = PersistReport::default();

        if !infra_envs.is_empty() {
            let ids: Vec<String> = infra_envs
                .iter()
                .filter_map(|doc| get_path_string(doc, "id"))
                .collect();
            report.infra_envs = self
                .changes
                .store_changes(
                    ChangeSet::new(&indices.infra_envs, infra_envs, content_hash)
                        .filter(Query::terms("id", ids)),
                )
                .await;
        }

        report.cluster = self
            .changes
            .store_changes(
                ChangeSet::new(&indices.clusters, vec![cluster], |doc| {
                    get_path_string(doc, STATE_ID_FIELD).unwrap_or_default()
                })
                .filter(Query::term("id", cluster_id)),
            )
            .await;

        if !events.is_empty() {
            self.log_missing_events(cluster_id, events.len()).await;
            report.events = self
                .changes
                .store_changes(
                    ChangeSet::new(&indices.events, events, |doc| {
                        event_id(
                            &get_path_string(doc, "event_time").unwrap_or_default(),
                            &get_path_string(doc, "cluster_id").unwrap_or_default(),
                            &get_path_string(doc, "message").unwrap_or_default(),
                        )
                    })
                    .filter(Query::term("cluster_id", cluster_id)),
                )
                .await;
        }

        if let Some(versions) = versions {
            // one document per distinct version set; the index stays small
            report.versions = self
                .changes
                .store_changes(
                    ChangeSet::new(&indices.versions, vec![versions], content_hash).enrich(
                        |mut doc| {
                            if let Some(object) = doc.as_object_mut() {
                                object.insert(
                                    "timestamp".to_string(),
                                    JsonValue::String(
                                        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                                    ),
                                );
                            }
                            doc
                        },
                    ),
                )
                .await;
        }

        report
    }

    /// Log when fewer events are stored than fetched. Informational only:
    /// the id diff in `store_changes` decides what is written.
    async fn log_missing_events(&self, cluster_id: &str, fetched: usize) {
        let query = Query::term("cluster_id", cluster_id);
        match self
            .changes
            .store()
            .count(&self.settings.indices.events, &query)
            .await
        {
            Ok(stored) if (stored as usize) < fetched => {
                debug!(cluster_id, "Cluster is missing {} stored events", fetched - stored as usize);
            }
            Ok(_) => {}
            Err(e) => debug!(cluster_id, "Could not count stored events: {e}"),
        }
    }
}

impl std::fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("settings", &self.settings)
            .field("changes", &self.changes)
            .field("cached_infra_envs", &self.infra_envs.len())
            .finish_non_exhaustive()
    }
}

/// Map "nothing there" answers of the inventory API to an empty value.
///
/// 404 is logged at debug, other client errors at warn; anything else is
/// returned.
fn or_empty<T: Default>(result: Result<T>, what: &str, cluster_id: &str) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_not_found() => {
            debug!(cluster_id, "No {what} found: {e}");
            Ok(T::default())
        }
        Err(e) if e.is_client_anomaly() => {
            warn!(cluster_id, "Unexpected response fetching {what}, using empty: {e}");
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}
