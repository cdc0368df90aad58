//! Change detection
//!
//! Writes only the candidate documents whose identity is not yet present in
//! the target index. Existing identities are collected by an ids-only scan
//! under a caller-supplied filter; the remaining documents are submitted as
//! `create` operations so a concurrent writer inserting the same identity
//! ends up as a conflict instead of an overwrite.

mod types;

pub use types::{ChangeSet, StoreReport};

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::store::{BulkAction, BulkFailure, Query, ScanOptions, SearchStore};
use futures::TryStreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default number of documents per bulk request
pub const DEFAULT_BULK_CHUNK_SIZE: usize = 500;

/// Idempotent writer on top of a [`SearchStore`]
pub struct ChangeDetectionStore {
    store: Arc<dyn SearchStore>,
    retry: RetryPolicy,
    bulk_chunk_size: usize,
}

impl ChangeDetectionStore {
    pub fn new(store: Arc<dyn SearchStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
        }
    }

    /// Set the retry policy applied to each scan and bulk request
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the number of documents per bulk request
    #[must_use]
    pub fn with_bulk_chunk_size(mut self, size: usize) -> Self {
        self.bulk_chunk_size = size.max(1);
        self
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn SearchStore> {
        &self.store
    }

    /// Identities present in `index` under `filter`.
    ///
    /// A missing index yields an empty set. The scan is retried as a whole.
    pub async fn existing_ids(&self, index: &str, filter: &Query) -> Result<HashSet<String>> {
        let options = ScanOptions::ids_only();
        let result = self
            .retry
            .run(&format!("scan {index}"), || async {
                self.store
                    .scan(index, filter, options)
                    .map_ok(|hit| hit.id)
                    .try_collect::<HashSet<_>>()
                    .await
            })
            .await;

        match result {
            Ok(ids) => Ok(ids),
            Err(e) if e.is_not_found() => {
                debug!(index, "Index does not exist yet");
                Ok(HashSet::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Persist the documents of `changes` that are not already stored.
    ///
    /// Never fails: scan and bulk failures are logged and reflected in the
    /// returned report. When the scan fails every candidate is submitted and
    /// the `create` semantics keep already-stored documents untouched.
    pub async fn store_changes(&self, changes: ChangeSet<'_>) -> StoreReport {
        let ChangeSet {
            index,
            documents,
            id_fn,
            enrich_fn,
            filter,
        } = changes;

        let mut report = StoreReport {
            candidates: documents.len(),
            ..StoreReport::default()
        };
        if documents.is_empty() {
            return report;
        }

        let existing = match self.existing_ids(&index, &filter).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(index = %index, "Failed to scan existing documents, submitting all: {e}");
                HashSet::new()
            }
        };

        let mut seen = HashSet::new();
        let mut actions = Vec::new();
        for document in documents {
            let id = id_fn(&document);
            if existing.contains(&id) {
                report.skipped_existing += 1;
                continue;
            }
            if !seen.insert(id.clone()) {
                report.duplicates += 1;
                continue;
            }
            let document = match &enrich_fn {
                Some(enrich) => enrich(document),
                None => document,
            };
            actions.push(BulkAction::create(index.as_str(), id, document));
        }

        for chunk in actions.chunks(self.bulk_chunk_size) {
            self.submit(&index, chunk.to_vec(), &mut report).await;
        }

        debug!(
            index = %index,
            "{} candidates: {} written, {} already stored, {} conflicts, {} failed",
            report.candidates,
            report.written,
            report.skipped_existing,
            report.conflicts,
            report.failed
        );
        report
    }
}

impl ChangeDetectionStore {
    /// Submit one chunk.
    ///
    /// Request-level failures are retried by the policy. Items rejected with
    /// a transient status (429, 5xx) are resubmitted on their own under the
    /// same attempt ceiling; anything left over is counted as failed.
    async fn submit(&self, index: &str, mut pending: Vec<BulkAction>, report: &mut StoreReport) {
        let mut attempt = 0;
        loop {
            let result = self
                .retry
                .run(&format!("bulk {index}"), || self.store.bulk(pending.clone()))
                .await;
            let bulk = match result {
                Ok(bulk) => bulk,
                Err(e) => {
                    error!(index, "Bulk submission of {} documents failed: {e}", pending.len());
                    report.failed += pending.len();
                    return;
                }
            };
            report.written += bulk.succeeded;
            report.conflicts += bulk.conflicts;

            let (transient, permanent): (Vec<BulkFailure>, Vec<BulkFailure>) =
                bulk.failed.into_iter().partition(BulkFailure::is_transient);
            for failure in &permanent {
                warn!(
                    index,
                    id = %failure.id,
                    status = failure.status,
                    "Document rejected: {}",
                    failure.reason
                );
            }
            report.failed += permanent.len();
            if transient.is_empty() {
                return;
            }

            let ids: HashSet<&str> = transient.iter().map(|f| f.id.as_str()).collect();
            pending.retain(|action| ids.contains(action.id.as_str()));
            if attempt >= self.retry.max_retries || pending.is_empty() {
                for failure in &transient {
                    warn!(
                        index,
                        id = %failure.id,
                        status = failure.status,
                        "Document not written after retries: {}",
                        failure.reason
                    );
                }
                report.failed += transient.len();
                return;
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                index,
                "{} documents rejected transiently, attempt {}/{}, resubmitting in {delay:?}",
                pending.len(),
                attempt + 1,
                self.retry.max_retries + 1
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl std::fmt::Debug for ChangeDetectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetectionStore")
            .field("retry", &self.retry)
            .field("bulk_chunk_size", &self.bulk_chunk_size)
            .finish_non_exhaustive()
    }
}
