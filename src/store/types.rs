//! Search store types
//!
//! Query model, scan hits and bulk actions shared by every store backend.

use crate::types::{compare_order_keys, get_path, get_path_string, JsonValue};
use serde_json::json;
use std::cmp::Ordering;

// ============================================================================
// Query
// ============================================================================

/// Filter clause understood by every store backend.
///
/// Field names are dotted paths into the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Query {
    /// Every document
    #[default]
    MatchAll,
    /// No document
    MatchNone,
    /// Field equals a value
    Term { field: String, value: String },
    /// Field equals one of the values
    Terms { field: String, values: Vec<String> },
    /// Field orders strictly after a value
    RangeGt { field: String, value: String },
    /// Field present and not null
    Exists { field: String },
    /// Conjunction of `must` with negation of every `must_not`
    Bool {
        must: Vec<Query>,
        must_not: Vec<Query>,
    },
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn terms<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::Terms {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range_gt(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::RangeGt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Query::Exists {
            field: field.into(),
        }
    }

    /// All of `must`, none of `must_not`
    pub fn bool(must: Vec<Query>, must_not: Vec<Query>) -> Self {
        Query::Bool { must, must_not }
    }

    /// Negation of a single clause
    pub fn not(query: Query) -> Self {
        Query::Bool {
            must: Vec::new(),
            must_not: vec![query],
        }
    }

    /// Render as an OpenSearch query DSL object
    pub fn to_json(&self) -> JsonValue {
        match self {
            Query::MatchAll => json!({"match_all": {}}),
            Query::MatchNone => json!({"match_none": {}}),
            Query::Term { field, value } => json!({"term": {field: value}}),
            Query::Terms { field, values } => json!({"terms": {field: values}}),
            Query::RangeGt { field, value } => json!({"range": {field: {"gt": value}}}),
            Query::Exists { field } => json!({"exists": {"field": field}}),
            Query::Bool { must, must_not } => {
                let mut clause = serde_json::Map::new();
                if !must.is_empty() {
                    clause.insert(
                        "must".into(),
                        JsonValue::Array(must.iter().map(Query::to_json).collect()),
                    );
                }
                if !must_not.is_empty() {
                    clause.insert(
                        "must_not".into(),
                        JsonValue::Array(must_not.iter().map(Query::to_json).collect()),
                    );
                }
                json!({ "bool": clause })
            }
        }
    }

    /// Evaluate against a document in process.
    ///
    /// Range comparison goes through order-key normalization so mixed
    /// timestamp formats compare as instants.
    pub fn matches(&self, doc: &JsonValue) -> bool {
        match self {
            Query::MatchAll => true,
            Query::MatchNone => false,
            Query::Term { field, value } => get_path_string(doc, field).as_ref() == Some(value),
            Query::Terms { field, values } => {
                get_path_string(doc, field).is_some_and(|v| values.contains(&v))
            }
            Query::RangeGt { field, value } => get_path_string(doc, field)
                .is_some_and(|v| compare_order_keys(&v, value) == Ordering::Greater),
            Query::Exists { field } => get_path(doc, field).is_some_and(|v| !v.is_null()),
            Query::Bool { must, must_not } => {
                must.iter().all(|q| q.matches(doc)) && !must_not.iter().any(|q| q.matches(doc))
            }
        }
    }
}

// ============================================================================
// Scan
// ============================================================================

/// Options for a scan
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Fetch document payloads; identities only when false
    pub with_source: bool,
    /// Page size requested from the backend
    pub batch_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            with_source: false,
            batch_size: 500,
        }
    }
}

impl ScanOptions {
    /// Identities only
    pub fn ids_only() -> Self {
        Self::default()
    }

    /// Full payloads with the given page size
    pub fn with_source(batch_size: usize) -> Self {
        Self {
            with_source: true,
            batch_size: batch_size.max(1),
        }
    }
}

/// One scanned document
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    /// Present only when the scan asked for payloads
    pub source: Option<JsonValue>,
}

// ============================================================================
// Bulk
// ============================================================================

/// Bulk operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOp {
    /// Insert or overwrite
    Index,
    /// Insert; an existing id is a conflict
    Create,
}

impl BulkOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOp::Index => "index",
            BulkOp::Create => "create",
        }
    }
}

/// One document write inside a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkAction {
    pub op: BulkOp,
    pub index: String,
    pub id: String,
    pub document: JsonValue,
}

impl BulkAction {
    pub fn create(index: impl Into<String>, id: impl Into<String>, document: JsonValue) -> Self {
        Self {
            op: BulkOp::Create,
            index: index.into(),
            id: id.into(),
            document,
        }
    }

    pub fn index(index: impl Into<String>, id: impl Into<String>, document: JsonValue) -> Self {
        Self {
            op: BulkOp::Index,
            index: index.into(),
            id: id.into(),
            document,
        }
    }
}

/// A failed bulk item
#[derive(Debug, Clone, PartialEq)]
pub struct BulkFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

impl BulkFailure {
    /// Rejected by back-pressure or a server fault; worth resubmitting
    pub fn is_transient(&self) -> bool {
        crate::error::is_retryable_status(self.status)
    }
}

/// Outcome of a bulk request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    /// Items written
    pub succeeded: usize,
    /// Items rejected because the id already existed
    pub conflicts: usize,
    /// Items that failed for any other reason
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}
