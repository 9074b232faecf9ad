//! MKS v1 API client

use crate::error::{MksError, Result};
use selectel_cloud::{HEADER_X_AUTH_TOKEN, ProviderContext, Scope, ServiceClient};
use selectel_cloud_vpc::project_token;
use selectel_config::Region;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cluster as reported by the API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cluster {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub kube_api_ip: String,
    #[serde(default)]
    pub kube_version: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub maintenance_window_start: String,
    #[serde(default)]
    pub maintenance_window_end: String,
    #[serde(default)]
    pub enable_autorepair: bool,
    #[serde(default)]
    pub enable_patch_version_auto_upgrade: bool,
    #[serde(default)]
    pub zonal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterCreateOpts {
    pub name: String,
    pub kube_version: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_window_start: Option<String>,
    pub enable_autorepair: bool,
    pub enable_patch_version_auto_upgrade: bool,
    pub zonal: bool,
    pub nodegroups: Vec<NodegroupCreateOpts>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_window_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_autorepair: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_patch_version_auto_upgrade: Option<bool>,
}

impl ClusterUpdateOpts {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub ip: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaintEffect {
    NoSchedule,
    NoExecute,
    PreferNoSchedule,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub effect: TaintEffect,
}

/// Nodegroup as reported by the API; nodegroups have no name there.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Nodegroup {
    pub id: String,
    #[serde(default)]
    pub flavor_id: String,
    #[serde(default)]
    pub volume_gb: u32,
    #[serde(default)]
    pub volume_type: String,
    #[serde(default)]
    pub local_volume: bool,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
    #[serde(default)]
    pub affinity_policy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodegroupCreateOpts {
    pub count: u32,
    pub availability_zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_mb: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_gb: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    pub local_volume: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypair_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity_policy: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KubeVersionView {
    pub version: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Serialize, Deserialize)]
struct ClusterEnvelope<T> {
    cluster: T,
}

#[derive(Serialize)]
struct NodegroupEnvelope<T> {
    nodegroup: T,
}

#[derive(Serialize)]
struct ResizeOpts {
    desired: u32,
}

#[derive(Deserialize)]
struct NodegroupsResponse {
    nodegroups: Vec<Nodegroup>,
}

#[derive(Deserialize)]
struct KubeVersionsResponse {
    kube_versions: Vec<KubeVersionView>,
}

/// MKS v1 client bound to one region and project token
#[derive(Debug, Clone)]
pub struct MksClient {
    client: ServiceClient,
}

impl MksClient {
    pub fn new(http: reqwest::Client, endpoint: &str, token: &str) -> Self {
        Self {
            client: ServiceClient::new(http, endpoint, HEADER_X_AUTH_TOKEN, token),
        }
    }

    pub fn endpoint_for(region: Region) -> String {
        format!("https://{region}.mks.selcloud.ru/v1")
    }

    /// Client for the scope's region, authenticated with a project token.
    pub async fn for_scope(ctx: &ProviderContext, scope: &Scope) -> Result<Self> {
        let (Some(project_id), Some(region)) = (scope.project_id.as_deref(), scope.region) else {
            return Err(MksError::MissingScope);
        };
        let token = project_token(ctx, project_id).await?;
        let endpoint = ctx
            .endpoint_override("mks")
            .map(str::to_string)
            .unwrap_or_else(|| Self::endpoint_for(region));
        Ok(Self::new(ctx.http().clone(), &endpoint, &token))
    }

    pub async fn create_cluster(&self, opts: &ClusterCreateOpts) -> Result<Cluster> {
        tracing::info!(name = %opts.name, region = %opts.region, "Creating cluster");
        let response: ClusterEnvelope<Cluster> = self
            .client
            .post("clusters", &ClusterEnvelope { cluster: opts })
            .await?;
        Ok(response.cluster)
    }

    pub async fn get_cluster(&self, id: &str) -> Result<Cluster> {
        tracing::debug!(id, "Getting cluster");
        let response: ClusterEnvelope<Cluster> =
            self.client.get(&format!("clusters/{id}")).await?;
        Ok(response.cluster)
    }

    pub async fn update_cluster(&self, id: &str, opts: &ClusterUpdateOpts) -> Result<()> {
        tracing::info!(id, ?opts, "Updating cluster");
        self.client
            .put_unit(&format!("clusters/{id}"), &ClusterEnvelope { cluster: opts })
            .await?;
        Ok(())
    }

    pub async fn delete_cluster(&self, id: &str) -> Result<()> {
        tracing::info!(id, "Deleting cluster");
        self.client.delete(&format!("clusters/{id}")).await?;
        Ok(())
    }

    pub async fn upgrade_patch_version(&self, id: &str) -> Result<()> {
        tracing::info!(id, "Upgrading cluster patch version");
        self.client
            .post_unit(
                &format!("clusters/{id}/upgrade-patch-version"),
                &serde_json::json!({}),
            )
            .await?;
        Ok(())
    }

    pub async fn upgrade_minor_version(&self, id: &str) -> Result<()> {
        tracing::info!(id, "Upgrading cluster minor version");
        self.client
            .post_unit(
                &format!("clusters/{id}/upgrade-minor-version"),
                &serde_json::json!({}),
            )
            .await?;
        Ok(())
    }

    pub async fn list_nodegroups(&self, cluster_id: &str) -> Result<Vec<Nodegroup>> {
        tracing::debug!(cluster_id, "Listing nodegroups");
        let response: NodegroupsResponse = self
            .client
            .get(&format!("clusters/{cluster_id}/nodegroups"))
            .await?;
        Ok(response.nodegroups)
    }

    pub async fn create_nodegroup(&self, cluster_id: &str, opts: &NodegroupCreateOpts) -> Result<()> {
        tracing::info!(cluster_id, zone = %opts.availability_zone, count = opts.count, "Creating nodegroup");
        self.client
            .post_unit(
                &format!("clusters/{cluster_id}/nodegroups"),
                &NodegroupEnvelope { nodegroup: opts },
            )
            .await?;
        Ok(())
    }

    pub async fn resize_nodegroup(&self, cluster_id: &str, nodegroup_id: &str, desired: u32) -> Result<()> {
        tracing::info!(cluster_id, nodegroup_id, desired, "Resizing nodegroup");
        self.client
            .post_unit(
                &format!("clusters/{cluster_id}/nodegroups/{nodegroup_id}/resize"),
                &NodegroupEnvelope {
                    nodegroup: ResizeOpts { desired },
                },
            )
            .await?;
        Ok(())
    }

    pub async fn delete_nodegroup(&self, cluster_id: &str, nodegroup_id: &str) -> Result<()> {
        tracing::info!(cluster_id, nodegroup_id, "Deleting nodegroup");
        self.client
            .delete(&format!("clusters/{cluster_id}/nodegroups/{nodegroup_id}"))
            .await?;
        Ok(())
    }

    pub async fn list_kube_versions(&self) -> Result<Vec<KubeVersionView>> {
        tracing::debug!("Listing kube versions");
        let response: KubeVersionsResponse = self.client.get("kubeversions").await?;
        Ok(response.kube_versions)
    }
}
