//! Incremental export
//!
//! Copies records that arrived in the search store since the last pass into
//! archive objects, then advances the per-partition offsets. Offsets move
//! only after every object of the pass has been completed, so a failed pass
//! can be rerun as a whole: its output may overlap earlier objects but never
//! skips a record.

mod query;
mod types;

pub use query::{export_queries, unseen_partitions_query};
pub use types::{ArchiveLayout, ExportReport, KeyContext, KeyFn, StreamDescriptor};

use crate::error::{Error, Result};
use crate::output::{batch_key, daily_key, ArchiveDestination, NdjsonWriter};
use crate::state::{Offset, OffsetRecord, OffsetStore};
use crate::store::{Query, ScanOptions, SearchStore};
use crate::types::{canonical_order_key, get_path_string, order_key_day, JsonValue};
use chrono::Utc;
use futures::TryStreamExt;
use sha2::{Digest, Sha256};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default number of records fetched per scan page
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Day segment for records without a parseable order key
const UNDATED: &str = "undated";

/// Exports streams from the search store into archive objects
pub struct IncrementalExporter {
    store: Arc<dyn SearchStore>,
    offsets: OffsetStore,
    destination: ArchiveDestination,
    layout: ArchiveLayout,
    chunk_size: usize,
}

/// Writers and high-water marks of a pass in progress
struct PassState {
    writers: BTreeMap<String, NdjsonWriter>,
    advanced: Offset,
    records: usize,
}

impl PassState {
    async fn abort(self) {
        for (_, writer) in self.writers {
            writer.abort().await;
        }
    }
}

impl IncrementalExporter {
    pub fn new(
        store: Arc<dyn SearchStore>,
        offsets: OffsetStore,
        destination: ArchiveDestination,
    ) -> Self {
        Self {
            store,
            offsets,
            destination,
            layout: ArchiveLayout::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the object layout
    #[must_use]
    pub fn with_layout(mut self, layout: ArchiveLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the scan page size
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn offsets(&self) -> &OffsetStore {
        &self.offsets
    }

    pub fn destination(&self) -> &ArchiveDestination {
        &self.destination
    }

    /// Key function of the configured layout
    pub fn layout_key_fn(&self) -> KeyFn {
        match self.layout {
            ArchiveLayout::Daily => Arc::new(|ctx: &KeyContext, record: &JsonValue| {
                let day = get_path_string(record, &ctx.order_key)
                    .and_then(|value| order_key_day(&value))
                    .unwrap_or_else(|| UNDATED.to_string());
                daily_key(&ctx.stream, &day, ctx.epoch, &ctx.checksum)
            }),
            ArchiveLayout::Batch => Arc::new(|ctx: &KeyContext, _: &JsonValue| {
                batch_key(&ctx.stream, &ctx.today, ctx.epoch, &ctx.checksum)
            }),
        }
    }

    /// One incremental pass using the configured layout
    pub async fn export_stream(&self, stream: &StreamDescriptor) -> Result<ExportReport> {
        let key_fn = self.layout_key_fn();
        self.export_stream_with(stream, key_fn.as_ref()).await
    }

    /// One incremental pass grouping records with `key_fn`.
    ///
    /// A missing source index means there is nothing to export. Any other
    /// failure discards the objects of the pass and leaves offsets untouched.
    pub async fn export_stream_with(
        &self,
        stream: &StreamDescriptor,
        key_fn: &(dyn Fn(&KeyContext, &JsonValue) -> String + Send + Sync),
    ) -> Result<ExportReport> {
        let offset = self
            .offsets
            .load_all(&stream.name)
            .await
            .map_err(|e| Error::export(&stream.name, format!("failed to load offsets: {e}")))?;
        debug!(stream = %stream.name, "Loaded {} cursors", offset.len());

        let now = Utc::now();
        let ctx = KeyContext {
            stream: stream.name.clone(),
            order_key: stream.order_key.clone(),
            today: now.format("%Y-%m-%d").to_string(),
            epoch: now.timestamp(),
            checksum: offset_checksum(&offset)?,
        };

        let mut pass = PassState {
            writers: BTreeMap::new(),
            advanced: Offset::new(&stream.name),
            records: 0,
        };

        let queries = export_queries(stream, &offset);
        if let Err(e) = self.consume(stream, &queries, &ctx, key_fn, &mut pass).await {
            pass.abort().await;
            if matches!(e, Error::IndexNotFound { .. }) {
                debug!(stream = %stream.name, "Source index does not exist, nothing to export");
                return Ok(ExportReport::empty(&stream.name));
            }
            return Err(Error::export(&stream.name, e.to_string()));
        }

        let mut report = ExportReport::empty(&stream.name);
        report.records = pass.records;

        let mut failure = None;
        for (_, writer) in pass.writers {
            if failure.is_some() {
                writer.abort().await;
                continue;
            }
            match writer.finish().await {
                Ok(object) => report.objects.push(object),
                Err(e) => failure = Some(e),
            }
        }
        if let Some(e) = failure {
            return Err(Error::export(&stream.name, e.to_string()));
        }

        report.offsets_saved = self
            .offsets
            .save(&pass.advanced)
            .await
            .map_err(|e| Error::export(&stream.name, format!("failed to save offsets: {e}")))?;

        info!(
            stream = %stream.name,
            "Exported {} records into {} objects",
            report.records,
            report.objects.len()
        );
        Ok(report)
    }

    async fn consume(
        &self,
        stream: &StreamDescriptor,
        queries: &[Query],
        ctx: &KeyContext,
        key_fn: &(dyn Fn(&KeyContext, &JsonValue) -> String + Send + Sync),
        pass: &mut PassState,
    ) -> Result<()> {
        let options = ScanOptions::with_source(self.chunk_size);
        for query in queries {
            debug!(stream = %stream.name, "Export query: {}", query.to_json());
            let mut hits = self.store.scan(&stream.name, query, options);
            while let Some(hit) = hits.try_next().await? {
                let Some(record) = hit.source else { continue };

                let writer = match pass.writers.entry(key_fn(ctx, &record)) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let writer = self.destination.writer(entry.key());
                        entry.insert(writer)
                    }
                };
                writer.write_record(&record).await?;
                pass.records += 1;

                let partition = stream
                    .partition_key
                    .as_deref()
                    .and_then(|key| get_path_string(&record, key));
                match get_path_string(&record, &stream.order_key) {
                    Some(raw) => match canonical_order_key(&raw) {
                        Some(value) => {
                            pass.advanced.advance(partition, value);
                        }
                        None => warn!(
                            stream = %stream.name,
                            id = %hit.id,
                            "Unparseable order key {raw:?}, cursor not advanced"
                        ),
                    },
                    None => debug!(stream = %stream.name, id = %hit.id, "Record has no order key"),
                }
            }
        }
        Ok(())
    }

    /// Export several streams one after another.
    ///
    /// A failing stream is logged and does not stop the others.
    pub async fn export_all(&self, streams: &[StreamDescriptor]) -> Vec<Result<ExportReport>> {
        let mut results = Vec::with_capacity(streams.len());
        for stream in streams {
            let result = self.export_stream(stream).await;
            if let Err(e) = &result {
                error!(stream = %stream.name, "Export failed: {e}");
            }
            results.push(result);
        }
        results
    }
}

impl std::fmt::Debug for IncrementalExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalExporter")
            .field("offsets", &self.offsets)
            .field("destination", &self.destination)
            .field("layout", &self.layout)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

/// SHA-256 (hex) of the offset a pass starts from
pub fn offset_checksum(offset: &Offset) -> Result<String> {
    let records: Vec<OffsetRecord> = offset.to_records();
    let bytes = serde_json::to_vec(&records)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests;
