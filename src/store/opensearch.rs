//! OpenSearch REST backend

use super::types::{BulkAction, BulkFailure, BulkReport, Hit, Query, ScanOptions};
use super::{HitStream, SearchStore};
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use crate::types::JsonValue;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

/// How long the server keeps a scroll context between pages
const SCROLL_KEEP_ALIVE: &str = "1m";

/// Search store backed by an OpenSearch cluster
#[derive(Debug)]
pub struct OpenSearchStore {
    http: HttpClient,
}

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: String,
    status: u16,
    #[serde(default)]
    error: Option<JsonValue>,
}

enum ScrollState {
    Start,
    Next(String),
    Done,
}

// ============================================================================
// Store
// ============================================================================

impl OpenSearchStore {
    /// Wrap an HTTP client whose base URL is the cluster endpoint
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    async fn open_scroll(
        &self,
        index: &str,
        query: &Query,
        options: ScanOptions,
    ) -> Result<SearchResponse> {
        let body = json!({
            "query": query.to_json(),
            "size": options.batch_size,
            "sort": ["_doc"],
            "_source": options.with_source,
        });
        let config = RequestConfig::new()
            .query("scroll", SCROLL_KEEP_ALIVE)
            .json(body);
        self.http
            .request_json(Method::POST, &format!("/{index}/_search"), config)
            .await
            .map_err(|e| index_error(index, e))
    }

    async fn next_page(&self, scroll_id: &str) -> Result<SearchResponse> {
        let config = RequestConfig::new().json(json!({
            "scroll": SCROLL_KEEP_ALIVE,
            "scroll_id": scroll_id,
        }));
        self.http
            .request_json(Method::POST, "/_search/scroll", config)
            .await
    }

    async fn clear_scroll(&self, scroll_id: &str) {
        let config = RequestConfig::new()
            .json(json!({ "scroll_id": scroll_id }))
            .retries(0);
        if let Err(e) = self
            .http
            .request(Method::DELETE, "/_search/scroll", config)
            .await
        {
            debug!("Failed to clear scroll context: {e}");
        }
    }
}

/// Map a 404 caused by a missing index to `IndexNotFound`
fn index_error(index: &str, error: Error) -> Error {
    match &error {
        Error::HttpStatus { status: 404, body } if body.contains("index_not_found_exception") => {
            Error::IndexNotFound {
                index: index.to_string(),
            }
        }
        _ => error,
    }
}

fn bulk_body(actions: &[BulkAction]) -> Result<String> {
    let mut body = String::new();
    for action in actions {
        let meta = json!({
            action.op.as_str(): { "_index": action.index, "_id": action.id }
        });
        body.push_str(&serde_json::to_string(&meta)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&action.document)?);
        body.push('\n');
    }
    Ok(body)
}

fn failure_reason(error: Option<JsonValue>) -> String {
    match error {
        Some(JsonValue::Object(map)) => map
            .get("reason")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| JsonValue::Object(map).to_string()),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl SearchStore for OpenSearchStore {
    fn scan<'a>(
        &'a self,
        index: &'a str,
        query: &'a Query,
        options: ScanOptions,
    ) -> HitStream<'a> {
        let pages = futures::stream::try_unfold(ScrollState::Start, move |state| async move {
            let response = match state {
                ScrollState::Done => return Ok::<_, Error>(None),
                ScrollState::Start => self.open_scroll(index, query, options).await?,
                ScrollState::Next(scroll_id) => match self.next_page(&scroll_id).await {
                    Ok(response) => response,
                    Err(e) => {
                        // release the server-side context before a retry opens another
                        self.clear_scroll(&scroll_id).await;
                        return Err(e);
                    }
                },
            };

            if response.hits.hits.is_empty() {
                if let Some(scroll_id) = response.scroll_id {
                    self.clear_scroll(&scroll_id).await;
                }
                return Ok(None);
            }

            let next = match response.scroll_id {
                Some(scroll_id) => ScrollState::Next(scroll_id),
                None => ScrollState::Done,
            };
            let hits: Vec<Hit> = response
                .hits
                .hits
                .into_iter()
                .map(|raw| Hit {
                    id: raw.id,
                    source: raw.source,
                })
                .collect();
            Ok(Some((hits, next)))
        });

        pages
            .map_ok(|page| futures::stream::iter(page.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    async fn count(&self, index: &str, query: &Query) -> Result<u64> {
        let config = RequestConfig::new().json(json!({ "query": query.to_json() }));
        let response: CountResponse = self
            .http
            .request_json(Method::POST, &format!("/{index}/_count"), config)
            .await
            .map_err(|e| index_error(index, e))?;
        Ok(response.count)
    }

    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<BulkReport> {
        if actions.is_empty() {
            return Ok(BulkReport::default());
        }

        let config = RequestConfig::new().ndjson(bulk_body(&actions)?);
        let response: BulkResponse = self
            .http
            .request_json(Method::POST, "/_bulk", config)
            .await?;

        let mut report = BulkReport::default();
        for item in response.items.into_iter().flat_map(HashMap::into_values) {
            match item.status {
                200..=299 => report.succeeded += 1,
                409 => report.conflicts += 1,
                status => {
                    warn!(id = %item.id, status, "Bulk item failed");
                    report.failed.push(BulkFailure {
                        id: item.id,
                        status,
                        reason: failure_reason(item.error),
                    });
                }
            }
        }
        debug!(
            "Bulk of {} actions: {} written, {} conflicts, {} failed",
            actions.len(),
            report.succeeded,
            report.conflicts,
            report.failed.len()
        );
        Ok(report)
    }
}
