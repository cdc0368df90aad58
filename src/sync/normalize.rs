//! Turning inventory records into search documents

use crate::error::{Error, Result};
use crate::inventory::{ClusterRecord, EventRecord, HostRecord, InfraEnvRecord};
use crate::types::{JsonObject, JsonValue};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Infra-env attributes summarized over a cluster's hosts
const SUMMARIZED_INFRA_ENV_FIELDS: &[&str] = &["type", "cpu_architecture", "openshift_version"];

/// Replace the cluster's user name with a keyed hash.
///
/// `user_id` is null when the name is missing or empty.
pub fn anonymize_cluster(cluster: &mut ClusterRecord, key: &[u8]) -> Result<()> {
    let user_id = match cluster.user_name.take() {
        Some(name) if !name.is_empty() => JsonValue::String(user_hash(&name, key)?),
        _ => JsonValue::Null,
    };
    cluster.extra.insert("user_id".to_string(), user_id);
    Ok(())
}

fn user_hash(name: &str, key: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| Error::config(format!("Invalid user hash key: {e}")))?;
    mac.update(name.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Parse a field holding embedded JSON text; unparseable text is kept as is
fn parse_embedded(text: &str, what: &str) -> JsonValue {
    serde_json::from_str(text).unwrap_or_else(|e| {
        debug!("Keeping unparseable {what} as text: {e}");
        JsonValue::String(text.to_string())
    })
}

/// Host document with its parsed inventory and infra env
pub fn host_document(host: &HostRecord, infra_env: Option<&InfraEnvRecord>) -> Result<JsonValue> {
    let mut doc = serde_json::to_value(host)?;
    if let Some(object) = doc.as_object_mut() {
        if let Some(inventory) = &host.inventory {
            object.remove("inventory");
            object.insert(
                "host_inventory".to_string(),
                parse_embedded(inventory, "host inventory"),
            );
        }
        if let Some(infra_env) = infra_env {
            object.insert("infra_env".to_string(), serde_json::to_value(infra_env)?);
        }
    }
    Ok(doc)
}

/// Summary of the infra-env attributes of a cluster's hosts.
///
/// Each attribute maps value to the share of hosts carrying it, among hosts
/// that carry the attribute at all.
pub fn hosts_summary(hosts: &[JsonValue]) -> JsonValue {
    let mut infra_env = JsonObject::new();
    for field in SUMMARIZED_INFRA_ENV_FIELDS {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for host in hosts {
            let value = host.get("infra_env").and_then(|ie| ie.get(*field));
            match value {
                Some(JsonValue::String(s)) => *counts.entry(s.clone()).or_default() += 1,
                Some(JsonValue::Null) | None => {}
                Some(other) => *counts.entry(other.to_string()).or_default() += 1,
            }
        }
        if counts.is_empty() {
            continue;
        }
        let total: usize = counts.values().sum();
        let ratios: JsonObject = counts
            .into_iter()
            .map(|(value, count)| (value, json!(count as f64 / total as f64)))
            .collect();
        infra_env.insert((*field).to_string(), JsonValue::Object(ratios));
    }

    let iso_type = match infra_env.get("type").and_then(JsonValue::as_object) {
        None => "Unknown".to_string(),
        Some(types) => types
            .iter()
            .find(|(_, ratio)| ratio.as_f64().is_some_and(|r| r >= 1.0))
            .map_or_else(|| "mixed".to_string(), |(iso, _)| iso.clone()),
    };
    let heterogeneous_arch = infra_env
        .get("cpu_architecture")
        .and_then(JsonValue::as_object)
        .is_some_and(|archs| !archs.values().any(|r| r.as_f64() == Some(1.0)));

    json!({
        "infra_env": infra_env,
        "host_count": hosts.len(),
        "heterogeneous_arch": heterogeneous_arch,
        "iso_type": iso_type,
    })
}

/// Cluster document: normalized hosts plus their summary
pub fn cluster_document(
    cluster: &ClusterRecord,
    infra_envs: &HashMap<String, InfraEnvRecord>,
) -> Result<JsonValue> {
    let hosts = cluster
        .hosts
        .iter()
        .map(|host| {
            let infra_env = host.infra_env_id.as_ref().and_then(|id| infra_envs.get(id));
            host_document(host, infra_env)
        })
        .collect::<Result<Vec<_>>>()?;
    let summary = hosts_summary(&hosts);

    let mut doc = serde_json::to_value(cluster)?;
    if let Some(object) = doc.as_object_mut() {
        object.insert("hosts".to_string(), JsonValue::Array(hosts));
        object.insert("hosts_summary".to_string(), summary);
    }
    Ok(doc)
}

/// Event document with its properties parsed
pub fn event_document(event: &EventRecord, cluster_id: &str) -> Result<JsonValue> {
    let mut doc = serde_json::to_value(event)?;
    if let Some(object) = doc.as_object_mut() {
        if event.cluster_id.is_none() {
            object.insert("cluster_id".to_string(), json!(cluster_id));
        }
        if let Some(props) = &event.props {
            object.insert("props".to_string(), parse_embedded(props, "event props"));
        }
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn host(id: &str, infra_env: &str) -> HostRecord {
        HostRecord {
            id: id.into(),
            infra_env_id: Some(infra_env.into()),
            ..HostRecord::default()
        }
    }

    fn infra_env(id: &str, iso: &str, arch: &str) -> InfraEnvRecord {
        InfraEnvRecord {
            id: id.into(),
            iso_type: Some(iso.into()),
            cpu_architecture: Some(arch.into()),
            openshift_version: Some("4.10".into()),
            ..InfraEnvRecord::default()
        }
    }

    #[test]
    fn test_anonymize() {
        let mut cluster = ClusterRecord {
            id: "c1".into(),
            user_name: Some("alice".into()),
            ..ClusterRecord::default()
        };
        anonymize_cluster(&mut cluster, b"key").unwrap();
        let user_id = cluster.extra["user_id"].as_str().unwrap().to_string();
        assert_eq!(user_id.len(), 64);
        assert!(cluster.user_name.is_none());

        let mut other = ClusterRecord {
            user_name: Some("alice".into()),
            ..ClusterRecord::default()
        };
        anonymize_cluster(&mut other, b"key").unwrap();
        assert_eq!(other.extra["user_id"], user_id.as_str());

        let mut rekeyed = ClusterRecord {
            user_name: Some("alice".into()),
            ..ClusterRecord::default()
        };
        anonymize_cluster(&mut rekeyed, b"other-key").unwrap();
        assert_ne!(rekeyed.extra["user_id"], user_id.as_str());
    }

    #[test]
    fn test_anonymize_empty_user() {
        let mut cluster = ClusterRecord {
            user_name: Some(String::new()),
            ..ClusterRecord::default()
        };
        anonymize_cluster(&mut cluster, b"key").unwrap();
        assert_eq!(cluster.extra["user_id"], JsonValue::Null);
        assert!(cluster.to_document().unwrap().get("user_name").is_none());
    }

    #[test]
    fn test_host_document_parses_inventory() {
        let host = HostRecord {
            id: "h1".into(),
            inventory: Some(r#"{"cpu": {"count": 4}}"#.into()),
            ..HostRecord::default()
        };
        let doc = host_document(&host, None).unwrap();
        assert_eq!(doc["host_inventory"]["cpu"]["count"], 4);
        assert!(doc.get("inventory").is_none());
    }

    #[test]
    fn test_hosts_summary_single_type() {
        let ie = infra_env("ie1", "full-iso", "x86_64");
        let hosts = vec![
            host_document(&host("h1", "ie1"), Some(&ie)).unwrap(),
            host_document(&host("h2", "ie1"), Some(&ie)).unwrap(),
        ];
        let summary = hosts_summary(&hosts);
        assert_eq!(summary["host_count"], 2);
        assert_eq!(summary["iso_type"], "full-iso");
        assert_eq!(summary["heterogeneous_arch"], false);
        assert_eq!(summary["infra_env"]["cpu_architecture"]["x86_64"], 1.0);
    }

    #[test]
    fn test_hosts_summary_mixed() {
        let a = infra_env("ie1", "full-iso", "x86_64");
        let b = infra_env("ie2", "minimal-iso", "arm64");
        let hosts = vec![
            host_document(&host("h1", "ie1"), Some(&a)).unwrap(),
            host_document(&host("h2", "ie2"), Some(&b)).unwrap(),
        ];
        let summary = hosts_summary(&hosts);
        assert_eq!(summary["iso_type"], "mixed");
        assert_eq!(summary["heterogeneous_arch"], true);
        assert_eq!(summary["infra_env"]["type"]["minimal-iso"], 0.5);
    }

    #[test]
    fn test_hosts_summary_without_infra_env() {
        let summary = hosts_summary(&[]);
        assert_eq!(summary["iso_type"], "Unknown");
        assert_eq!(summary["heterogeneous_arch"], false);
        assert_eq!(summary["host_count"], 0);
    }

    #[test]
    fn test_event_document() {
        let event = EventRecord {
            event_time: "2022-01-01T00:00:00Z".into(),
            message: "done".into(),
            props: Some(r#"{"duration": 5}"#.into()),
            ..EventRecord::default()
        };
        let doc = event_document(&event, "c1").unwrap();
        assert_eq!(doc["cluster_id"], "c1");
        assert_eq!(doc["props"]["duration"], 5);
    }
}
