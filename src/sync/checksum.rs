//! Change-detection identities
//!
//! Every identity is a SHA-256 hex digest. Document hashes are computed over
//! a canonical rendering with object keys sorted, so the digest does not
//! depend on field order.

use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Field of the cluster document holding its state id
pub const STATE_ID_FIELD: &str = "cluster_state_id";

/// Volatile fields excluded from the cluster state id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatileFields {
    /// Top-level cluster fields
    pub cluster: Vec<String>,
    /// Fields of each host
    pub host: Vec<String>,
}

impl Default for VolatileFields {
    fn default() -> Self {
        Self {
            cluster: ["updated_at", "status_updated_at", "progress", "status_info"]
                .map(String::from)
                .to_vec(),
            host: [
                "updated_at",
                "checked_in_at",
                "status_updated_at",
                "progress",
                "status_info",
                "connectivity",
                "free_addresses",
                "ntp_sources",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// Copy of `value` with every object's keys in sorted order
pub fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = JsonObject::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            JsonValue::Object(sorted)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash of a document's full content
pub fn content_hash(value: &JsonValue) -> String {
    sha256_hex(canonicalize(value).to_string().as_bytes())
}

/// Identity of an event: hash of its time, cluster and message
pub fn event_id(event_time: &str, cluster_id: &str, message: &str) -> String {
    sha256_hex(format!("{event_time}{cluster_id}{message}").as_bytes())
}

/// State id of a cluster document.
///
/// Volatile fields (and any previously embedded state id) are stripped and
/// hosts are ordered by id before hashing, so two documents that differ
/// only in ignored fields or host order get the same id.
pub fn cluster_state_id(document: &JsonValue, volatile: &VolatileFields) -> String {
    let mut stripped = document.clone();
    if let Some(cluster) = stripped.as_object_mut() {
        cluster.remove(STATE_ID_FIELD);
        for field in &volatile.cluster {
            cluster.remove(field);
        }
        if let Some(JsonValue::Array(hosts)) = cluster.get_mut("hosts") {
            for host in hosts.iter_mut().filter_map(JsonValue::as_object_mut) {
                for field in &volatile.host {
                    host.remove(field);
                }
            }
            hosts.sort_by(|a, b| host_sort_key(a).cmp(host_sort_key(b)));
        }
    }
    content_hash(&stripped)
}

fn host_sort_key(host: &JsonValue) -> &str {
    host.get("id").and_then(JsonValue::as_str).unwrap_or_default()
}
