//! Searchable store access
//!
//! The `SearchStore` trait is the only seam between the sync/export logic
//! and the document store. `OpenSearchStore` talks to an OpenSearch (or
//! Elasticsearch) cluster over REST; `MemoryStore` keeps documents in
//! process with the same query semantics.

mod memory;
mod opensearch;
mod types;

pub use memory::MemoryStore;
pub use opensearch::OpenSearchStore;
pub use types::{BulkAction, BulkFailure, BulkOp, BulkReport, Hit, Query, ScanOptions};

use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Stream of scanned documents
pub type HitStream<'a> = Pin<Box<dyn Stream<Item = Result<Hit>> + Send + 'a>>;

/// Query, scan and bulk-write capability of a document store
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Stream every document of `index` matching `query`.
    ///
    /// A missing index surfaces as `Error::IndexNotFound` on the first item.
    fn scan<'a>(&'a self, index: &'a str, query: &'a Query, options: ScanOptions)
        -> HitStream<'a>;

    /// Number of documents of `index` matching `query`
    async fn count(&self, index: &str, query: &Query) -> Result<u64>;

    /// Submit a batch of writes.
    ///
    /// Per-item failures are reported in the returned [`BulkReport`]; only a
    /// failure of the request as a whole is an `Err`.
    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<BulkReport>;
}
