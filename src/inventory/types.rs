//! Inventory record types
//!
//! Fields the sync logic inspects are typed; everything else the API sends
//! is kept verbatim in the flattened `extra` map and passed through to the
//! search store.

use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};

/// A cluster as listed by the inventory API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Raw user identifier; replaced by `user_id` before storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub hosts: Vec<HostRecord>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// A host belonging to a cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra_env_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_hostname: Option<String>,
    /// Hardware inventory, sent by the API as an embedded JSON string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// A cluster lifecycle event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra_env_id: Option<String>,
    pub event_time: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Free-form event properties, sent as an embedded JSON string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// An infrastructure environment referenced by hosts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraEnvRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub iso_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openshift_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// Versions of the inventory service components
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(flatten)]
    pub components: JsonObject,
}

impl VersionRecord {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ClusterRecord {
    /// Distinct infra-env ids referenced by this cluster's hosts, in first-seen order
    pub fn infra_env_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.hosts.iter().filter_map(|h| h.infra_env_id.as_ref()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// Convert to a JSON document
    pub fn to_document(&self) -> crate::error::Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }
}
