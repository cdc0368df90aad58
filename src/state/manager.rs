//! Offset store implementation
//!
//! Offsets live in a dedicated index of the search store, one document per
//! (stream, partition) with a deterministic id, written with `index`
//! operations so a save overwrites in place.

use super::types::{offset_doc_id, Cursor, Offset, OffsetRecord};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::store::{BulkAction, Query, ScanOptions, SearchStore};
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::debug;

/// Index holding offset documents unless configured otherwise
pub const DEFAULT_OFFSET_INDEX: &str = ".export_offsets";

/// Loads and saves stream offsets
pub struct OffsetStore {
    store: Arc<dyn SearchStore>,
    index: String,
    retry: RetryPolicy,
}

impl OffsetStore {
    /// Create an offset store on the given index
    pub fn new(store: Arc<dyn SearchStore>, index: impl Into<String>) -> Self {
        Self {
            store,
            index: index.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the retry policy for reads and writes
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Index the offsets are stored in
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Load every cursor of a stream.
    ///
    /// An unknown stream, or a missing offsets index, yields an empty offset.
    pub async fn load_all(&self, stream: &str) -> Result<Offset> {
        let query = Query::term("stream", stream);
        let options = ScanOptions::with_source(100);
        let result = self
            .retry
            .run(&format!("load offsets of {stream}"), || async {
                self.store
                    .scan(&self.index, &query, options)
                    .try_collect::<Vec<_>>()
                    .await
            })
            .await;

        let hits = match result {
            Ok(hits) => hits,
            Err(e) if e.is_not_found() => {
                debug!(stream, "Offsets index does not exist yet");
                return Ok(Offset::new(stream));
            }
            Err(e) => return Err(e),
        };

        let mut records = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(source) = hit.source else { continue };
            let record: OffsetRecord = serde_json::from_value(source).map_err(|e| {
                Error::state(format!("Malformed offset document '{}': {e}", hit.id))
            })?;
            records.push(record);
        }
        Ok(Offset::from_records(stream, records))
    }

    /// Load the cursor of one partition (empty if never saved)
    pub async fn load(&self, stream: &str, partition: Option<&str>) -> Result<Cursor> {
        Ok(self.load_all(stream).await?.cursor(partition))
    }

    /// Persist the cursors of `offset` that move a partition forward.
    ///
    /// Each cursor is compared with the stored one and written only when it
    /// is strictly greater; partitions not present in `offset` are left
    /// alone. Returns the number of documents written.
    pub async fn save(&self, offset: &Offset) -> Result<usize> {
        let mut merged = self.load_all(offset.stream()).await?;

        let actions: Vec<BulkAction> = offset
            .cursors()
            .filter(|cursor| merged.apply(cursor.clone()))
            .map(|cursor| {
                let record = OffsetRecord {
                    stream: offset.stream().to_string(),
                    partition: cursor.partition.clone(),
                    offset: cursor.value.clone().unwrap_or_default(),
                };
                let id = offset_doc_id(offset.stream(), cursor.partition.as_deref());
                serde_json::to_value(&record).map(|doc| BulkAction::index(&self.index, id, doc))
            })
            .collect::<std::result::Result<_, _>>()?;

        if actions.is_empty() {
            debug!(stream = offset.stream(), "Offsets unchanged");
            return Ok(0);
        }

        let count = actions.len();
        let report = self
            .retry
            .run(&format!("save offsets of {}", offset.stream()), || {
                self.store.bulk(actions.clone())
            })
            .await?;

        if let Some(failure) = report.failed.first() {
            return Err(Error::state(format!(
                "Failed to save offset '{}': {} {}",
                failure.id, failure.status, failure.reason
            )));
        }

        debug!(stream = offset.stream(), "Saved {count} offsets");
        Ok(count)
    }

    /// Persist a single cursor
    pub async fn save_cursor(&self, stream: &str, cursor: Cursor) -> Result<usize> {
        let mut offset = Offset::new(stream);
        offset.apply(cursor);
        self.save(&offset).await
    }
}

impl std::fmt::Debug for OffsetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffsetStore")
            .field("index", &self.index)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
