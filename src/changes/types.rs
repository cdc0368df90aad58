//! Change detection types

use crate::store::Query;
use crate::types::JsonValue;

type IdFn<'a> = Box<dyn Fn(&JsonValue) -> String + Send + Sync + 'a>;
type EnrichFn<'a> = Box<dyn Fn(JsonValue) -> JsonValue + Send + Sync + 'a>;

/// Candidate documents for one index together with how to identify them
pub struct ChangeSet<'a> {
    pub(super) index: String,
    pub(super) documents: Vec<JsonValue>,
    pub(super) id_fn: IdFn<'a>,
    pub(super) enrich_fn: Option<EnrichFn<'a>>,
    pub(super) filter: Query,
}

impl<'a> ChangeSet<'a> {
    /// Candidates for `index`, identified by `id_fn`.
    ///
    /// The scan filter defaults to match-all; callers should narrow it.
    pub fn new<F>(index: impl Into<String>, documents: Vec<JsonValue>, id_fn: F) -> Self
    where
        F: Fn(&JsonValue) -> String + Send + Sync + 'a,
    {
        Self {
            index: index.into(),
            documents,
            id_fn: Box::new(id_fn),
            enrich_fn: None,
            filter: Query::MatchAll,
        }
    }

    /// Restrict the existing-identity scan
    #[must_use]
    pub fn filter(mut self, filter: Query) -> Self {
        self.filter = filter;
        self
    }

    /// Transform each new document right before it is written
    #[must_use]
    pub fn enrich<F>(mut self, enrich_fn: F) -> Self
    where
        F: Fn(JsonValue) -> JsonValue + Send + Sync + 'a,
    {
        self.enrich_fn = Some(Box::new(enrich_fn));
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl std::fmt::Debug for ChangeSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSet")
            .field("index", &self.index)
            .field("documents", &self.documents.len())
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Outcome of one `store_changes` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreReport {
    /// Documents offered
    pub candidates: usize,
    /// Dropped because the identity was already stored
    pub skipped_existing: usize,
    /// Dropped because an earlier candidate had the same identity
    pub duplicates: usize,
    /// Newly written
    pub written: usize,
    /// Lost a race with a concurrent writer; already present
    pub conflicts: usize,
    /// Not written
    pub failed: usize,
}

impl StoreReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
