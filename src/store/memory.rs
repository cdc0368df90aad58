//! In-process search store

use super::types::{BulkAction, BulkOp, BulkReport, Hit, Query, ScanOptions};
use super::{HitStream, SearchStore};
use crate::error::{Error, Result};
use crate::types::JsonValue;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Indices = HashMap<String, BTreeMap<String, JsonValue>>;

/// Search store holding every index in memory.
///
/// Scans return documents in id order. Indices are created on first write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    indices: Mutex<Indices>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Indices> {
        self.indices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty index if it does not exist
    pub fn create_index(&self, index: &str) {
        self.lock().entry(index.to_string()).or_default();
    }

    /// Insert or overwrite a document directly
    pub fn insert(&self, index: &str, id: impl Into<String>, document: JsonValue) {
        self.lock()
            .entry(index.to_string())
            .or_default()
            .insert(id.into(), document);
    }

    /// Fetch one document
    pub fn get(&self, index: &str, id: &str) -> Option<JsonValue> {
        self.lock().get(index).and_then(|docs| docs.get(id).cloned())
    }

    /// All documents of an index in id order
    pub fn documents(&self, index: &str) -> Vec<(String, JsonValue)> {
        self.lock()
            .get(index)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Number of documents in an index (0 if missing)
    pub fn len(&self, index: &str) -> usize {
        self.lock().get(index).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, index: &str) -> bool {
        self.len(index) == 0
    }

    fn search(&self, index: &str, query: &Query, with_source: bool) -> Result<Vec<Hit>> {
        let indices = self.lock();
        let docs = indices.get(index).ok_or_else(|| Error::IndexNotFound {
            index: index.to_string(),
        })?;
        Ok(docs
            .iter()
            .filter(|(_, doc)| query.matches(doc))
            .map(|(id, doc)| Hit {
                id: id.clone(),
                source: with_source.then(|| doc.clone()),
            })
            .collect())
    }
}

#[async_trait]
impl SearchStore for MemoryStore {
    fn scan<'a>(
        &'a self,
        index: &'a str,
        query: &'a Query,
        options: ScanOptions,
    ) -> HitStream<'a> {
        match self.search(index, query, options.with_source) {
            Ok(hits) => Box::pin(futures::stream::iter(hits.into_iter().map(Ok))),
            Err(e) => Box::pin(futures::stream::once(async move { Err(e) })),
        }
    }

    async fn count(&self, index: &str, query: &Query) -> Result<u64> {
        Ok(self.search(index, query, false)?.len() as u64)
    }

    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<BulkReport> {
        let mut report = BulkReport::default();
        let mut indices = self.lock();
        for action in actions {
            let docs = indices.entry(action.index).or_default();
            match action.op {
                BulkOp::Create if docs.contains_key(&action.id) => report.conflicts += 1,
                _ => {
                    docs.insert(action.id, action.document);
                    report.succeeded += 1;
                }
            }
        }
        Ok(report)
    }
}
