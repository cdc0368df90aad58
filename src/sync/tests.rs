//! Tests for inventory synchronization

use super::*;
use crate::changes::ChangeDetectionStore;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig};
use crate::inventory::{
    ClusterRecord, EventRecord, HostRecord, InfraEnvRecord, InventoryApi, InventoryClient,
    VersionRecord,
};
use crate::retry::RetryPolicy;
use crate::store::MemoryStore;
use crate::types::{get_path_string, BackoffType, JsonValue};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Fixtures
// ============================================================================

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_retries(max_retries)
        .with_backoff(
            BackoffType::Constant,
            Duration::from_millis(1),
            Duration::from_millis(1),
        )
        .with_jitter(Duration::ZERO)
}

fn host(id: &str, infra_env_id: &str) -> HostRecord {
    HostRecord {
        id: id.to_string(),
        infra_env_id: Some(infra_env_id.to_string()),
        inventory: Some(r#"{"cpu": {"count": 4}}"#.to_string()),
        ..HostRecord::default()
    }
}

fn cluster(id: &str, hosts: Vec<HostRecord>) -> ClusterRecord {
    ClusterRecord {
        id: id.to_string(),
        name: Some(format!("name-{id}")),
        user_name: Some("jdoe".to_string()),
        updated_at: Some("2023-01-01T00:00:00Z".to_string()),
        hosts,
        ..ClusterRecord::default()
    }
}

fn event(cluster_id: &str, time: &str, message: &str) -> EventRecord {
    EventRecord {
        cluster_id: Some(cluster_id.to_string()),
        event_time: time.to_string(),
        message: message.to_string(),
        props: Some(r#"{"host_count": 2}"#.to_string()),
        ..EventRecord::default()
    }
}

fn infra_env(id: &str) -> InfraEnvRecord {
    InfraEnvRecord {
        id: id.to_string(),
        iso_type: Some("full-iso".to_string()),
        cpu_architecture: Some("x86_64".to_string()),
        ..InfraEnvRecord::default()
    }
}

/// In-process inventory with call counters and failure injection
#[derive(Default)]
struct FakeInventory {
    clusters: Vec<ClusterRecord>,
    hosts: HashMap<String, Vec<HostRecord>>,
    events: HashMap<String, Vec<EventRecord>>,
    infra_envs: HashMap<String, InfraEnvRecord>,
    /// Clusters whose event lookup fails with a 500
    failing: HashSet<String>,
    /// Clusters whose event lookup panics
    panicking: HashSet<String>,
    /// Delay of every host lookup
    host_delay: Duration,
    list_fails: bool,
    infra_env_calls: AtomicU32,
}

#[async_trait]
impl InventoryApi for FakeInventory {
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>> {
        if self.list_fails {
            return Err(Error::http_status(503, "unavailable"));
        }
        Ok(self.clusters.clone())
    }

    async fn get_cluster_hosts(&self, cluster_id: &str) -> Result<Vec<HostRecord>> {
        if !self.host_delay.is_zero() {
            tokio::time::sleep(self.host_delay).await;
        }
        self.hosts
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| Error::http_status(404, "no such cluster"))
    }

    async fn get_events(&self, cluster_id: &str, _categories: &[&str]) -> Result<Vec<EventRecord>> {
        if self.failing.contains(cluster_id) {
            return Err(Error::http_status(500, "boom"));
        }
        assert!(!self.panicking.contains(cluster_id), "event lookup crashed");
        Ok(self.events.get(cluster_id).cloned().unwrap_or_default())
    }

    async fn get_versions(&self) -> Result<VersionRecord> {
        let mut version = VersionRecord::default();
        version
            .components
            .insert("assisted-service".to_string(), json!("v2.1.0"));
        Ok(version)
    }

    async fn get_infra_env(&self, infra_env_id: &str) -> Result<InfraEnvRecord> {
        self.infra_env_calls.fetch_add(1, Ordering::SeqCst);
        self.infra_envs
            .get(infra_env_id)
            .cloned()
            .ok_or_else(|| Error::http_status(404, "no such infra env"))
    }
}

fn inventory_with(clusters: Vec<ClusterRecord>) -> FakeInventory {
    let mut events = HashMap::new();
    for cluster in &clusters {
        events.insert(
            cluster.id.clone(),
            vec![
                event(&cluster.id, "2023-01-01T10:00:00Z", "Cluster created"),
                event(&cluster.id, "2023-01-01T11:00:00Z", "Installation started"),
            ],
        );
    }
    FakeInventory {
        clusters,
        events,
        infra_envs: HashMap::from([("ie1".to_string(), infra_env("ie1"))]),
        ..FakeInventory::default()
    }
}

fn settings() -> WorkerSettings {
    WorkerSettings {
        user_hash_key: "secret".to_string(),
        ..WorkerSettings::default()
    }
}

fn worker_for(
    inventory: Arc<dyn InventoryApi>,
    store: &Arc<MemoryStore>,
    settings: WorkerSettings,
) -> SyncWorker {
    let changes = ChangeDetectionStore::new(store.clone()).with_retry(fast_retry(1));
    SyncWorker::new(inventory, changes, settings)
}

#[derive(Default)]
struct RecordingSink {
    reported: Mutex<Vec<String>>,
}

impl ErrorSink for RecordingSink {
    fn report(&self, cluster_id: &str, _error: &Error) {
        self.reported.lock().unwrap().push(cluster_id.to_string());
    }
}

// ============================================================================
// Worker
// ============================================================================

#[tokio::test]
async fn test_persists_cluster_and_related_documents() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![cluster(
        "c1",
        vec![host("h1", "ie1"), host("h2", "ie1")],
    )]));
    let worker = worker_for(inventory.clone(), &store, settings());

    let outcome = worker
        .store_events_for_cluster(inventory.clusters[0].clone())
        .await;
    let WorkOutcome::Persisted { state_id, .. } = outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };

    let clusters = store.documents(".clusters");
    assert_eq!(clusters.len(), 1);
    let (id, doc) = &clusters[0];
    assert_eq!(id, &state_id);
    assert_eq!(doc[STATE_ID_FIELD], json!(state_id));
    assert_eq!(doc["hosts"][0]["host_inventory"]["cpu"]["count"], 4);
    assert_eq!(doc["hosts"][0]["infra_env"]["type"], "full-iso");
    assert_eq!(doc["hosts_summary"]["host_count"], 2);
    assert_eq!(doc["hosts_summary"]["iso_type"], "full-iso");

    assert_eq!(store.len(".events"), 2);
    assert_eq!(store.len(".infra_envs"), 1);
    let versions = store.documents(".component_versions");
    assert_eq!(versions.len(), 1);
    assert!(versions[0].1.get("timestamp").is_some());

    assert_eq!(worker.errors().get(), 0);
    assert!(worker.liveness().last_change().is_some());
}

#[tokio::test]
async fn test_user_name_is_never_stored() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![cluster("c1", vec![host("h1", "ie1")])]));
    let worker = worker_for(inventory.clone(), &store, settings());

    worker
        .store_events_for_cluster(inventory.clusters[0].clone())
        .await;

    let (_, doc) = &store.documents(".clusters")[0];
    assert!(doc.get("user_name").is_none());
    let user_id = get_path_string(doc, "user_id").unwrap();
    assert_eq!(user_id.len(), 64);
    assert!(!doc.to_string().contains("jdoe"));
}

#[tokio::test]
async fn test_second_round_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![cluster("c1", vec![host("h1", "ie1")])]));
    let worker = worker_for(inventory.clone(), &store, settings());

    worker
        .store_events_for_cluster(inventory.clusters[0].clone())
        .await;
    let before: Vec<_> = [".clusters", ".events", ".infra_envs"]
        .iter()
        .map(|index| store.documents(index))
        .collect();

    worker
        .store_events_for_cluster(inventory.clusters[0].clone())
        .await;
    let after: Vec<_> = [".clusters", ".events", ".infra_envs"]
        .iter()
        .map(|index| store.documents(index))
        .collect();

    assert_eq!(before, after);
    assert_eq!(store.len(".component_versions"), 1);
}

#[tokio::test]
async fn test_volatile_change_keeps_cluster_document() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![cluster("c1", vec![host("h1", "ie1")])]));
    let worker = worker_for(inventory.clone(), &store, settings());

    let mut record = inventory.clusters[0].clone();
    worker.store_events_for_cluster(record.clone()).await;

    record.updated_at = Some("2023-06-01T00:00:00Z".to_string());
    worker.store_events_for_cluster(record.clone()).await;
    assert_eq!(store.len(".clusters"), 1);

    record.extra.insert("status".to_string(), json!("installed"));
    worker.store_events_for_cluster(record).await;
    assert_eq!(store.len(".clusters"), 2);
}

#[tokio::test]
async fn test_blacklisted_cluster_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![cluster("c1", vec![host("h1", "ie1")])]));
    let worker = worker_for(
        inventory.clone(),
        &store,
        WorkerSettings {
            blacklist: HashSet::from(["name-c1".to_string()]),
            ..settings()
        },
    );

    let outcome = worker
        .store_events_for_cluster(inventory.clusters[0].clone())
        .await;

    assert!(matches!(outcome, WorkOutcome::Rejected { .. }));
    assert_eq!(worker.errors().get(), 0);
    assert!(store.is_empty(".clusters"));
    assert!(store.is_empty(".events"));
}

#[tokio::test]
async fn test_host_ceiling_rejects_cluster() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![cluster(
        "c1",
        vec![host("h1", "ie1"), host("h2", "ie1")],
    )]));
    let worker = worker_for(
        inventory.clone(),
        &store,
        WorkerSettings {
            max_hosts: 1,
            ..settings()
        },
    );

    let outcome = worker
        .store_events_for_cluster(inventory.clusters[0].clone())
        .await;

    let WorkOutcome::Rejected { reason, .. } = outcome else {
        panic!("expected a rejection");
    };
    assert!(reason.contains("2 hosts"));
    assert_eq!(worker.errors().get(), 0);
    assert!(store.is_empty(".clusters"));
}

#[tokio::test]
async fn test_hosts_fetched_when_missing() {
    let store = Arc::new(MemoryStore::new());
    let mut inventory = inventory_with(vec![cluster("c1", Vec::new())]);
    inventory
        .hosts
        .insert("c1".to_string(), vec![host("h1", "ie1"), host("h2", "ie1")]);
    let inventory = Arc::new(inventory);
    let worker = worker_for(inventory.clone(), &store, settings());

    worker
        .store_events_for_cluster(inventory.clusters[0].clone())
        .await;

    let (_, doc) = &store.documents(".clusters")[0];
    assert_eq!(doc["hosts"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_hosts_and_infra_env_are_empty() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![
        cluster("c1", Vec::new()),
        cluster("c2", vec![host("h1", "missing")]),
    ]));
    let worker = worker_for(inventory.clone(), &store, settings());

    for record in inventory.clusters.clone() {
        let outcome = worker.store_events_for_cluster(record).await;
        assert!(matches!(outcome, WorkOutcome::Persisted { .. }));
    }

    assert_eq!(worker.errors().get(), 0);
    assert_eq!(store.len(".clusters"), 2);
    assert!(store.is_empty(".infra_envs"));
}

#[tokio::test]
async fn test_infra_env_cache_shared_across_clusters() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![
        cluster("c1", vec![host("h1", "ie1"), host("h2", "ie1")]),
        cluster("c2", vec![host("h3", "ie1")]),
    ]));
    let worker = worker_for(inventory.clone(), &store, settings());

    for record in inventory.clusters.clone() {
        worker.store_events_for_cluster(record).await;
    }

    assert_eq!(inventory.infra_env_calls.load(Ordering::SeqCst), 1);
    assert_eq!(worker.cache().len(), 1);
}

#[tokio::test]
async fn test_events_truncated() {
    let store = Arc::new(MemoryStore::new());
    let mut inventory = inventory_with(vec![cluster("c1", vec![host("h1", "ie1")])]);
    inventory.events.insert(
        "c1".to_string(),
        (0..5)
            .map(|i| event("c1", &format!("2023-01-01T10:0{i}:00Z"), "tick"))
            .collect(),
    );
    let inventory = Arc::new(inventory);
    let worker = worker_for(
        inventory.clone(),
        &store,
        WorkerSettings {
            max_events: 3,
            ..settings()
        },
    );

    worker
        .store_events_for_cluster(inventory.clusters[0].clone())
        .await;

    assert_eq!(store.len(".events"), 3);
    let (_, doc) = &store.documents(".events")[0];
    assert_eq!(doc["props"]["host_count"], 2);
}

#[tokio::test]
async fn test_unexpected_failure_is_counted_and_reported() {
    let store = Arc::new(MemoryStore::new());
    let mut inventory = inventory_with(vec![
        cluster("bad", vec![host("h1", "ie1")]),
        cluster("good", vec![host("h2", "ie1")]),
    ]);
    inventory.failing.insert("bad".to_string());
    let inventory = Arc::new(inventory);
    let sink = Arc::new(RecordingSink::default());
    let worker =
        worker_for(inventory.clone(), &store, settings()).with_error_sink(sink.clone());

    let outcomes: Vec<_> = futures::future::join_all(
        inventory
            .clusters
            .iter()
            .map(|record| worker.store_events_for_cluster(record.clone())),
    )
    .await;

    assert!(matches!(outcomes[0], WorkOutcome::Failed { .. }));
    assert!(matches!(outcomes[1], WorkOutcome::Persisted { .. }));
    assert_eq!(worker.errors().get(), 1);
    assert_eq!(*sink.reported.lock().unwrap(), vec!["bad".to_string()]);
    assert_eq!(store.len(".clusters"), 1);
}

// ============================================================================
// Inventory over HTTP
// ============================================================================

async fn http_inventory(server: &MockServer) -> Arc<dyn InventoryApi> {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .retry(fast_retry(2))
        .no_rate_limit()
        .build();
    Mock::given(method("GET"))
        .and(path("/v2/component-versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"versions": {}})))
        .mount(server)
        .await;
    Arc::new(InventoryClient::new(HttpClient::with_config(config).unwrap()))
}

#[tokio::test]
async fn test_http_404_hosts_is_empty_and_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/clusters/c1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let worker = worker_for(http_inventory(&server).await, &store, settings());

    let outcome = worker
        .store_events_for_cluster(cluster("c1", Vec::new()))
        .await;

    assert!(matches!(outcome, WorkOutcome::Persisted { .. }));
    assert_eq!(worker.errors().get(), 0);
    let (_, doc) = &store.documents(".clusters")[0];
    assert_eq!(doc["hosts"], json!([]));
}

#[tokio::test]
async fn test_http_500_counts_one_error_per_cluster() {
    let server = MockServer::start().await;
    // three attempts per cluster
    Mock::given(method("GET"))
        .and(path("/v2/clusters/c1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/clusters/c2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let worker = worker_for(http_inventory(&server).await, &store, settings());

    for id in ["c1", "c2"] {
        let outcome = worker.store_events_for_cluster(cluster(id, Vec::new())).await;
        assert!(matches!(outcome, WorkOutcome::Failed { .. }));
    }

    assert_eq!(worker.errors().get(), 2);
    assert!(store.is_empty(".clusters"));
}

// ============================================================================
// Pool
// ============================================================================

fn pool_for(
    inventory: Arc<FakeInventory>,
    store: &Arc<MemoryStore>,
    n_workers: usize,
) -> (SyncWorkerPool, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let worker = Arc::new(worker_for(inventory, store, settings()));
    (SyncWorkerPool::new(worker, n_workers, rx), tx)
}

#[tokio::test]
async fn test_pool_processes_every_cluster() {
    let store = Arc::new(MemoryStore::new());
    let clusters: Vec<_> = (0..5)
        .map(|i| cluster(&format!("c{i}"), vec![host(&format!("h{i}"), "ie1")]))
        .collect();
    let inventory = Arc::new(inventory_with(clusters.clone()));
    let (pool, _tx) = pool_for(inventory, &store, 2);

    let report = pool.process_clusters(clusters).await;

    assert_eq!(
        report,
        RoundReport {
            submitted: 5,
            persisted: 5,
            ..RoundReport::default()
        }
    );
    assert_eq!(store.len(".clusters"), 5);
    assert_eq!(store.len(".events"), 10);
}

#[tokio::test]
async fn test_pool_panicking_cluster_costs_only_itself() {
    let store = Arc::new(MemoryStore::new());
    let clusters: Vec<_> = (0..4)
        .map(|i| cluster(&format!("c{i}"), vec![host(&format!("h{i}"), "ie1")]))
        .collect();
    let mut inventory = inventory_with(clusters.clone());
    inventory.panicking.insert("c1".to_string());
    let (pool, _tx) = pool_for(Arc::new(inventory), &store, 1);

    let report = pool.process_clusters(clusters).await;

    assert_eq!(
        report,
        RoundReport {
            submitted: 4,
            persisted: 3,
            failed: 1,
            ..RoundReport::default()
        }
    );
    assert_eq!(pool.worker().errors().get(), 1);
    assert_eq!(store.len(".clusters"), 3);
}

#[tokio::test]
async fn test_pool_clamps_worker_count() {
    let store = Arc::new(MemoryStore::new());
    let (pool, _tx) = pool_for(Arc::new(FakeInventory::default()), &store, 0);
    assert_eq!(pool.n_workers(), 1);
    assert_eq!(pool.process_clusters(Vec::new()).await, RoundReport::default());
}

#[tokio::test]
async fn test_pool_does_not_start_after_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let clusters = vec![cluster("c1", vec![host("h1", "ie1")])];
    let inventory = Arc::new(inventory_with(clusters.clone()));
    let (pool, tx) = pool_for(inventory, &store, 2);
    tx.send(true).unwrap();

    let report = pool.process_clusters(clusters).await;

    assert_eq!(report.cancelled, 1);
    assert_eq!(report.completed(), 0);
    assert!(store.is_empty(".clusters"));
}

#[tokio::test]
async fn test_shutdown_cancels_queued_clusters() {
    let store = Arc::new(MemoryStore::new());
    let clusters: Vec<_> = (0..3).map(|i| cluster(&format!("c{i}"), Vec::new())).collect();
    let mut inventory = inventory_with(clusters.clone());
    for record in &clusters {
        inventory
            .hosts
            .insert(record.id.clone(), vec![host("h", "ie1")]);
    }
    inventory.host_delay = Duration::from_millis(300);
    let (pool, tx) = pool_for(Arc::new(inventory), &store, 1);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        // keep the sender alive until the round is over
        tokio::time::sleep(Duration::from_secs(2)).await;
    });
    let report = pool.process_clusters(clusters).await;

    assert_eq!(report.persisted, 1);
    assert_eq!(report.cancelled, 2);
    assert_eq!(store.len(".clusters"), 1);
}

// ============================================================================
// Service
// ============================================================================

fn service_for(
    inventory: Arc<FakeInventory>,
    store: &Arc<MemoryStore>,
    settings: SupervisorSettings,
) -> (SyncService, watch::Sender<bool>) {
    let (pool, tx) = pool_for(inventory.clone(), store, 2);
    let service = SyncService::new(inventory, pool, settings, tx.subscribe());
    (service, tx)
}

fn quick_supervisor() -> SupervisorSettings {
    SupervisorSettings {
        round_interval: Duration::from_millis(10),
        ..SupervisorSettings::default()
    }
}

#[tokio::test]
async fn test_run_once_completes_round() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![cluster("c1", vec![host("h1", "ie1")])]));
    let (service, _tx) = service_for(inventory, &store, quick_supervisor());

    assert_eq!(service.run(true).await, StopReason::Completed);
    assert_eq!(store.len(".clusters"), 1);
}

#[tokio::test]
async fn test_empty_listing_skips_round() {
    let store = Arc::new(MemoryStore::new());
    let (service, _tx) = service_for(Arc::new(FakeInventory::default()), &store, quick_supervisor());

    assert_eq!(service.run_round().await, RoundReport::default());
    assert_eq!(service.pool().worker().errors().get(), 0);
}

#[tokio::test]
async fn test_listing_failure_is_counted() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(FakeInventory {
        list_fails: true,
        ..FakeInventory::default()
    });
    let (service, _tx) = service_for(inventory, &store, quick_supervisor());

    service.run_round().await;
    assert_eq!(service.pool().worker().errors().get(), 1);
}

#[tokio::test]
async fn test_stops_after_too_many_errors() {
    let store = Arc::new(MemoryStore::new());
    let mut inventory = inventory_with(vec![
        cluster("a", vec![host("h1", "ie1")]),
        cluster("b", vec![host("h2", "ie1")]),
    ]);
    inventory.failing = HashSet::from(["a".to_string(), "b".to_string()]);
    let (service, _tx) = service_for(
        Arc::new(inventory),
        &store,
        SupervisorSettings {
            errors_before_restart: 3,
            ..quick_supervisor()
        },
    );

    // two errors per round; the limit is passed in the second round
    let reason = service.run(false).await;
    assert_eq!(reason, StopReason::TooManyErrors);
    assert!(reason.wants_restart());
    assert_eq!(service.pool().worker().errors().get(), 4);
}

#[tokio::test]
async fn test_stops_when_idle() {
    let store = Arc::new(MemoryStore::new());
    let (service, _tx) = service_for(
        Arc::new(FakeInventory::default()),
        &store,
        SupervisorSettings {
            max_idle: Duration::ZERO,
            ..quick_supervisor()
        },
    );

    assert_eq!(service.run(false).await, StopReason::Idle);
}

#[tokio::test]
async fn test_verdict_none_after_progress() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![cluster("c1", vec![host("h1", "ie1")])]));
    let (service, _tx) = service_for(inventory, &store, quick_supervisor());

    service.run_round().await;
    assert_eq!(service.verdict(), None);
}

#[tokio::test]
async fn test_shutdown_interrupts_wait() {
    let store = Arc::new(MemoryStore::new());
    let inventory = Arc::new(inventory_with(vec![cluster("c1", vec![host("h1", "ie1")])]));
    let (service, tx) = service_for(
        inventory,
        &store,
        SupervisorSettings {
            round_interval: Duration::from_secs(3600),
            ..SupervisorSettings::default()
        },
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
    });
    let reason = tokio::time::timeout(Duration::from_secs(5), service.run(false))
        .await
        .unwrap();
    assert_eq!(reason, StopReason::Shutdown);
    assert!(!reason.wants_restart());
}

#[test]
fn test_work_state_terminal() {
    assert!(WorkState::Persisted.is_terminal());
    assert!(WorkState::Failed.is_terminal());
    assert!(!WorkState::Fetching.is_terminal());
    let item = WorkItem::new(cluster("c1", Vec::new()));
    assert_eq!(item.state, WorkState::Queued);
}

#[test]
fn test_document_helpers_are_exported() {
    let doc: JsonValue = json!({"id": "c1", "hosts": []});
    assert_eq!(
        cluster_state_id(&doc, &VolatileFields::default()),
        cluster_state_id(&canonicalize(&doc), &VolatileFields::default())
    );
}
