//! Tests for the incremental exporter

use super::*;
use crate::state::DEFAULT_OFFSET_INDEX;
use crate::store::{BulkAction, BulkReport, HitStream, MemoryStore};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::{tempdir, TempDir};

fn events_stream() -> StreamDescriptor {
    StreamDescriptor::new(".events", "event_time").partitioned_by("cluster_id")
}

fn exporter(memory: &Arc<MemoryStore>) -> (IncrementalExporter, TempDir) {
    let dir = tempdir().unwrap();
    let destination = ArchiveDestination::parse(dir.path().to_str().unwrap()).unwrap();
    let offsets = OffsetStore::new(memory.clone(), DEFAULT_OFFSET_INDEX);
    (
        IncrementalExporter::new(memory.clone(), offsets, destination).with_chunk_size(2),
        dir,
    )
}

fn seed_events(memory: &MemoryStore) {
    let records = [
        ("e1", "c1", "2022-01-01T01:00:00Z"),
        ("e2", "c1", "2022-01-02T01:00:00Z"),
        ("e3", "c2", "2022-01-02T05:00:00Z"),
        ("e4", "c2", "2022-01-03T01:00:00Z"),
        ("e5", "c3", "2022-01-03T02:00:00Z"),
        ("e6", "c3", "2022-01-04T01:00:00Z"),
        ("e7", "c1", "2022-01-04T09:00:00Z"),
    ];
    for (id, cluster, time) in records {
        memory.insert(
            ".events",
            id,
            json!({"cluster_id": cluster, "event_time": time, "message": id}),
        );
    }
}

async fn total_lines(destination: &ArchiveDestination, keys: &[String]) -> usize {
    let mut total = 0;
    for key in keys {
        total += destination.read_to_string(key).await.unwrap().lines().count();
    }
    total
}

// ============================================================================
// Grouping
// ============================================================================

#[tokio::test]
async fn test_one_object_per_day() {
    let memory = Arc::new(MemoryStore::new());
    seed_events(&memory);
    let (exporter, _dir) = exporter(&memory);

    let report = exporter.export_stream(&events_stream()).await.unwrap();

    assert_eq!(report.records, 7);
    assert_eq!(report.objects.len(), 4);
    let keys = exporter.destination().list_keys(None).await.unwrap();
    let days: Vec<&str> = keys.iter().map(|k| k.split('/').nth(1).unwrap()).collect();
    assert_eq!(days, vec!["2022-01-01", "2022-01-02", "2022-01-03", "2022-01-04"]);
    assert!(keys.iter().all(|k| k.starts_with("events/") && k.ends_with(".ndjson")));
    assert_eq!(total_lines(exporter.destination(), &keys).await, 7);
}

#[tokio::test]
async fn test_offsets_track_high_water_per_partition() {
    let memory = Arc::new(MemoryStore::new());
    seed_events(&memory);
    let (exporter, _dir) = exporter(&memory);

    let report = exporter.export_stream(&events_stream()).await.unwrap();
    assert_eq!(report.offsets_saved, 3);

    let offset = exporter.offsets().load_all(".events").await.unwrap();
    assert_eq!(offset.get(Some("c1")), Some("2022-01-04T09:00:00Z"));
    assert_eq!(offset.get(Some("c2")), Some("2022-01-03T01:00:00Z"));
    assert_eq!(offset.get(Some("c3")), Some("2022-01-04T01:00:00Z"));
}

#[tokio::test]
async fn test_unparseable_order_key_never_becomes_the_cursor() {
    let memory = Arc::new(MemoryStore::new());
    memory.insert(".events", "e1", json!({"cluster_id": "c1", "event_time": "2022-01-01T01:00:00Z"}));
    memory.insert(".events", "e2", json!({"cluster_id": "c1", "event_time": "garbage"}));
    let (exporter, _dir) = exporter(&memory);

    let first = exporter.export_stream(&events_stream()).await.unwrap();
    assert_eq!(first.records, 2);
    let offset = exporter.offsets().load_all(".events").await.unwrap();
    assert_eq!(offset.get(Some("c1")), Some("2022-01-01T01:00:00Z"));

    memory.insert(".events", "e3", json!({"cluster_id": "c1", "event_time": "2023-06-01T00:00:00Z"}));
    let second = exporter.export_stream(&events_stream()).await.unwrap();
    assert_eq!(second.records, 1);
    let offset = exporter.offsets().load_all(".events").await.unwrap();
    assert_eq!(offset.get(Some("c1")), Some("2023-06-01T00:00:00Z"));
}

#[tokio::test]
async fn test_cursor_is_stored_in_canonical_form() {
    let memory = Arc::new(MemoryStore::new());
    memory.insert(".events", "e1", json!({"cluster_id": "c1", "event_time": "2022-01-01 01:00:00"}));
    memory.insert(".events", "e2", json!({"cluster_id": "c2", "event_time": "2022-01-01T03:00:00+02:00"}));
    let (exporter, _dir) = exporter(&memory);

    exporter.export_stream(&events_stream()).await.unwrap();

    let offset = exporter.offsets().load_all(".events").await.unwrap();
    assert_eq!(offset.get(Some("c1")), Some("2022-01-01T01:00:00Z"));
    assert_eq!(offset.get(Some("c2")), Some("2022-01-01T01:00:00Z"));
}

// ============================================================================
// Incremental behaviour
// ============================================================================

#[tokio::test]
async fn test_second_pass_without_new_data_writes_nothing() {
    let memory = Arc::new(MemoryStore::new());
    seed_events(&memory);
    let (exporter, _dir) = exporter(&memory);

    exporter.export_stream(&events_stream()).await.unwrap();
    let offsets_before = memory.documents(DEFAULT_OFFSET_INDEX);
    let keys_before = exporter.destination().list_keys(None).await.unwrap();

    let second = exporter.export_stream(&events_stream()).await.unwrap();

    assert_eq!(second.records, 0);
    assert!(second.objects.is_empty());
    assert_eq!(second.offsets_saved, 0);
    assert_eq!(exporter.destination().list_keys(None).await.unwrap(), keys_before);
    assert_eq!(memory.documents(DEFAULT_OFFSET_INDEX), offsets_before);
}

#[tokio::test]
async fn test_new_records_and_new_partitions_are_picked_up() {
    let memory = Arc::new(MemoryStore::new());
    seed_events(&memory);
    let (exporter, _dir) = exporter(&memory);
    exporter.export_stream(&events_stream()).await.unwrap();

    // newer record in a known partition, older record in a known partition,
    // and a partition never seen before
    memory.insert(".events", "e8", json!({"cluster_id": "c1", "event_time": "2022-01-05T00:00:00Z"}));
    memory.insert(".events", "e9", json!({"cluster_id": "c2", "event_time": "2022-01-01T00:00:00Z"}));
    memory.insert(".events", "e10", json!({"cluster_id": "c4", "event_time": "2021-12-31T00:00:00Z"}));

    let report = exporter.export_stream(&events_stream()).await.unwrap();

    assert_eq!(report.records, 2);
    let offset = exporter.offsets().load_all(".events").await.unwrap();
    assert_eq!(offset.get(Some("c1")), Some("2022-01-05T00:00:00Z"));
    assert_eq!(offset.get(Some("c4")), Some("2021-12-31T00:00:00Z"));
}

#[tokio::test]
async fn test_records_without_partition_value() {
    let memory = Arc::new(MemoryStore::new());
    memory.insert(".events", "a", json!({"event_time": "2022-01-01T00:00:00Z"}));
    memory.insert(".events", "b", json!({"cluster_id": null, "event_time": "2022-01-02T00:00:00Z"}));
    let (exporter, _dir) = exporter(&memory);

    let first = exporter.export_stream(&events_stream()).await.unwrap();
    assert_eq!(first.records, 2);
    let offset = exporter.offsets().load_all(".events").await.unwrap();
    assert_eq!(offset.get(None), Some("2022-01-02T00:00:00Z"));

    memory.insert(".events", "c", json!({"event_time": "2022-01-03T00:00:00Z"}));
    memory.insert(".events", "d", json!({"cluster_id": "c9", "event_time": "2020-01-01T00:00:00Z"}));
    let second = exporter.export_stream(&events_stream()).await.unwrap();
    assert_eq!(second.records, 2);

    let third = exporter.export_stream(&events_stream()).await.unwrap();
    assert_eq!(third.records, 0);
}

#[tokio::test]
async fn test_missing_index_is_nothing_to_export() {
    let memory = Arc::new(MemoryStore::new());
    let (exporter, _dir) = exporter(&memory);

    let report = exporter.export_stream(&events_stream()).await.unwrap();

    assert_eq!(report, ExportReport::empty(".events"));
    assert!(memory.is_empty(DEFAULT_OFFSET_INDEX));
}

// ============================================================================
// Layouts
// ============================================================================

#[tokio::test]
async fn test_unpartitioned_batch_layout() {
    let memory = Arc::new(MemoryStore::new());
    memory.insert(".component_versions", "v1", json!({"release_tag": "v1", "timestamp": "2022-01-01T00:00:00Z"}));
    memory.insert(".component_versions", "v2", json!({"release_tag": "v2", "timestamp": "2022-01-05T00:00:00Z"}));
    let (exporter, _dir) = exporter(&memory);
    let exporter = exporter.with_layout(ArchiveLayout::Batch);
    let stream = StreamDescriptor::new(".component_versions", "timestamp");

    let report = exporter.export_stream(&stream).await.unwrap();

    assert_eq!(report.records, 2);
    let keys = exporter.destination().list_keys(None).await.unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("export-"));
    assert!(keys[0].contains("/component_versions_"));

    let cursor = exporter.offsets().load(".component_versions", None).await.unwrap();
    assert_eq!(cursor.value.as_deref(), Some("2022-01-05T00:00:00Z"));

    memory.insert(".component_versions", "v3", json!({"release_tag": "v3", "timestamp": "2022-01-06T00:00:00Z"}));
    let second = exporter.export_stream(&stream).await.unwrap();
    assert_eq!(second.records, 1);
}

#[tokio::test]
async fn test_custom_key_function() {
    let memory = Arc::new(MemoryStore::new());
    seed_events(&memory);
    let (exporter, _dir) = exporter(&memory);

    let report = exporter
        .export_stream_with(&events_stream(), &|ctx: &KeyContext, record: &JsonValue| {
            let cluster = get_path_string(record, "cluster_id").unwrap_or_default();
            format!("{}/{cluster}.ndjson", ctx.stream.trim_start_matches('.'))
        })
        .await
        .unwrap();

    assert_eq!(report.objects.len(), 3);
    assert_eq!(
        exporter.destination().list_keys(None).await.unwrap(),
        vec!["events/c1.ndjson", "events/c2.ndjson", "events/c3.ndjson"]
    );
}

#[test]
fn test_offset_checksum_changes_with_offset() {
    let mut offset = Offset::new(".events");
    let empty = offset_checksum(&offset).unwrap();
    offset.advance(Some("c1".into()), "2022-01-01");
    let advanced = offset_checksum(&offset).unwrap();
    assert_ne!(empty, advanced);
    assert_eq!(advanced.len(), 64);
    assert_eq!(advanced, offset_checksum(&offset.clone()).unwrap());
}

// ============================================================================
// Failure semantics
// ============================================================================

/// Store whose scans break after the first page while `broken` is set
struct BreakingStore {
    inner: MemoryStore,
    broken: AtomicBool,
}

#[async_trait::async_trait]
impl SearchStore for BreakingStore {
    fn scan<'a>(
        &'a self,
        index: &'a str,
        query: &'a Query,
        options: ScanOptions,
    ) -> HitStream<'a> {
        let hits = self.inner.scan(index, query, options);
        if self.broken.load(Ordering::SeqCst) {
            let failure = futures::stream::once(async { Err(Error::http_status(503, "")) });
            hits.take(1).chain(failure).boxed()
        } else {
            hits
        }
    }

    async fn count(&self, index: &str, query: &Query) -> Result<u64> {
        self.inner.count(index, query).await
    }

    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<BulkReport> {
        self.inner.bulk(actions).await
    }
}

#[tokio::test]
async fn test_failed_pass_leaves_offsets_and_objects_untouched() {
    let store = Arc::new(BreakingStore {
        inner: MemoryStore::new(),
        broken: AtomicBool::new(true),
    });
    seed_events(&store.inner);
    let dir = tempdir().unwrap();
    let destination = ArchiveDestination::parse(dir.path().to_str().unwrap()).unwrap();
    let offsets = OffsetStore::new(store.clone(), DEFAULT_OFFSET_INDEX)
        .with_retry(crate::retry::RetryPolicy::none());
    let exporter = IncrementalExporter::new(store.clone(), offsets, destination);

    let err = exporter.export_stream(&events_stream()).await.unwrap_err();
    assert!(matches!(err, Error::Export { ref stream, .. } if stream == ".events"));
    assert!(store.inner.is_empty(DEFAULT_OFFSET_INDEX));
    assert!(exporter.destination().list_keys(None).await.unwrap().is_empty());

    // the retried pass exports everything
    store.broken.store(false, Ordering::SeqCst);
    let report = exporter.export_stream(&events_stream()).await.unwrap();
    assert_eq!(report.records, 7);
}

#[tokio::test]
async fn test_export_all_continues_after_failure() {
    let memory = Arc::new(MemoryStore::new());
    seed_events(&memory);
    let (exporter, _dir) = exporter(&memory);

    let results = exporter
        .export_all(&[
            StreamDescriptor::new(".missing", "timestamp"),
            events_stream(),
        ])
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().records, 0);
    assert_eq!(results[1].as_ref().unwrap().records, 7);
}
