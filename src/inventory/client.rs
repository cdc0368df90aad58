//! REST client for the inventory service

use super::types::{ClusterRecord, EventRecord, HostRecord, InfraEnvRecord, VersionRecord};
use crate::error::Result;
use crate::http::{HttpClient, RequestConfig};
use async_trait::async_trait;
use tracing::debug;

/// Event categories pulled for every cluster
pub const EVENT_CATEGORIES: &[&str] = &["user", "metrics"];

/// Read access to the inventory service.
///
/// Implementations surface HTTP failures unchanged (a 404 is an
/// `Error::HttpStatus { status: 404 }`); mapping them to empty results is
/// the caller's decision.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// List every cluster visible to the credentials
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>>;

    /// Hosts of one cluster
    async fn get_cluster_hosts(&self, cluster_id: &str) -> Result<Vec<HostRecord>>;

    /// Events of one cluster, restricted to the given categories
    async fn get_events(&self, cluster_id: &str, categories: &[&str]) -> Result<Vec<EventRecord>>;

    /// Component versions of the service
    async fn get_versions(&self) -> Result<VersionRecord>;

    /// One infrastructure environment
    async fn get_infra_env(&self, infra_env_id: &str) -> Result<InfraEnvRecord>;
}

/// Inventory API over HTTP
#[derive(Debug)]
pub struct InventoryClient {
    http: HttpClient,
}

impl InventoryClient {
    /// Wrap an HTTP client whose base URL points at the API root
    /// (for example `https://api.example.com/api/assisted-install`)
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl InventoryApi for InventoryClient {
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>> {
        let clusters: Vec<ClusterRecord> = self
            .http
            .get_json_with_config("/v2/clusters", RequestConfig::new())
            .await?;
        debug!("Listed {} clusters", clusters.len());
        Ok(clusters)
    }

    async fn get_cluster_hosts(&self, cluster_id: &str) -> Result<Vec<HostRecord>> {
        let cluster: ClusterRecord = self
            .http
            .get_json_with_config(&format!("/v2/clusters/{cluster_id}"), RequestConfig::new())
            .await?;
        Ok(cluster.hosts)
    }

    async fn get_events(&self, cluster_id: &str, categories: &[&str]) -> Result<Vec<EventRecord>> {
        let mut config = RequestConfig::new().query("cluster_id", cluster_id);
        for category in categories {
            config = config.query("categories", *category);
        }
        self.http.get_json_with_config("/v2/events", config).await
    }

    async fn get_versions(&self) -> Result<VersionRecord> {
        self.http
            .get_json_with_config("/v2/component-versions", RequestConfig::new())
            .await
    }

    async fn get_infra_env(&self, infra_env_id: &str) -> Result<InfraEnvRecord> {
        self.http
            .get_json_with_config(
                &format!("/v2/infra-envs/{infra_env_id}"),
                RequestConfig::new(),
            )
            .await
    }
}
