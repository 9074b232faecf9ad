//! `selectel_mks_cluster_v1`

use crate::client::{Cluster, ClusterCreateOpts, ClusterUpdateOpts, MksClient};
use crate::error::{MksError, Result};
use crate::kube_version::{self, UpgradeStep};
use crate::nodegroup::{NodegroupSpec, NodegroupState, plan_nodegroups};
use crate::quota;
use async_trait::async_trait;
use selectel_cloud::{
    ActionType, CloudError, Identified, Plan, Observation, PollTiming, ProviderContext, ResourceHandler,
    Scope, StateRefresh, StateWaiter, Timeouts, deletion_observation, find_duplicate_key,
};
use selectel_cloud_vpc::ResellClient;
use selectel_config::Region;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

const OBJECT: &str = "cluster";
const NODEGROUP_OBJECT: &str = "cluster nodegroup";

const PENDING: &[&str] = &[
    "PENDING_CREATE",
    "PENDING_UPDATE",
    "PENDING_UPGRADE_PATCH_VERSION",
    "PENDING_UPGRADE_MINOR_VERSION",
    "PENDING_UPGRADE_CLUSTER_CONFIGURATION",
    "PENDING_RESIZE",
];
const ACTIVE: &[&str] = &["ACTIVE"];

/// Regions where managed Kubernetes is offered
pub const CLUSTER_REGIONS: [Region; 5] = [
    Region::Ru1,
    Region::Ru2,
    Region::Ru3,
    Region::Ru7,
    Region::Ru8,
];

fn default_true() -> bool {
    true
}

/// Declared cluster
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub project_id: String,
    pub region: Region,
    /// Defaults to the version the API flags as default when omitted
    #[serde(default)]
    pub kube_version: Option<String>,
    pub nodegroups: Vec<NodegroupSpec>,
    #[serde(default = "default_true")]
    pub enable_autorepair: bool,
    #[serde(default = "default_true")]
    pub enable_patch_version_auto_upgrade: bool,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub maintenance_window_start: Option<String>,
    #[serde(default)]
    pub zonal: bool,
}

impl ClusterSpec {
    fn validate(&self) -> Result<()> {
        if !CLUSTER_REGIONS.contains(&self.region) {
            return Err(MksError::UnsupportedRegion(self.region));
        }
        if self.nodegroups.is_empty() {
            return Err(MksError::NoNodegroups);
        }
        if let Some(name) = find_duplicate_key(&self.nodegroups, |ng| ng.name.clone()) {
            return Err(MksError::DuplicateNodegroup(name));
        }
        Ok(())
    }

    /// First field that only a new cluster can change.
    fn replaced_field(&self, new: &ClusterSpec) -> Option<&'static str> {
        [
            ("name", self.name != new.name),
            ("project_id", self.project_id != new.project_id),
            ("region", self.region != new.region),
            ("network_id", self.network_id != new.network_id),
            ("subnet_id", self.subnet_id != new.subnet_id),
            ("zonal", self.zonal != new.zonal),
        ]
        .into_iter()
        .find_map(|(field, changed)| changed.then_some(field))
    }

    fn create_opts(&self, kube_version: &str) -> ClusterCreateOpts {
        ClusterCreateOpts {
            name: self.name.clone(),
            kube_version: kube_version::normalize(kube_version).to_string(),
            region: self.region.to_string(),
            network_id: self.network_id.clone(),
            subnet_id: self.subnet_id.clone(),
            maintenance_window_start: self.maintenance_window_start.clone(),
            enable_autorepair: self.enable_autorepair,
            enable_patch_version_auto_upgrade: self.enable_patch_version_auto_upgrade,
            zonal: self.zonal,
            nodegroups: self.nodegroups.iter().take(1).map(NodegroupSpec::create_opts).collect(),
        }
    }
}

/// Cluster-level changes between two declarations.
pub fn cluster_update_opts(old: &ClusterSpec, new: &ClusterSpec) -> ClusterUpdateOpts {
    ClusterUpdateOpts {
        maintenance_window_start: (old.maintenance_window_start != new.maintenance_window_start)
            .then(|| new.maintenance_window_start.clone().unwrap_or_default()),
        enable_autorepair: (old.enable_autorepair != new.enable_autorepair)
            .then_some(new.enable_autorepair),
        enable_patch_version_auto_upgrade: (old.enable_patch_version_auto_upgrade
            != new.enable_patch_version_auto_upgrade)
            .then_some(new.enable_patch_version_auto_upgrade),
    }
}

/// Observed cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterState {
    pub id: String,
    pub name: String,
    pub status: String,
    pub project_id: String,
    pub region: String,
    pub kube_version: String,
    pub kube_api_ip: String,
    pub network_id: String,
    pub subnet_id: String,
    pub maintenance_window_start: String,
    pub maintenance_window_end: String,
    pub enable_autorepair: bool,
    pub enable_patch_version_auto_upgrade: bool,
    pub zonal: bool,
    pub nodegroups: Vec<NodegroupState>,
}

impl Identified for ClusterState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl ClusterState {
    fn new(cluster: Cluster, nodegroups: Vec<NodegroupState>) -> Self {
        Self {
            kube_version: kube_version::normalize(&cluster.kube_version).to_string(),
            id: cluster.id,
            name: cluster.name,
            status: cluster.status,
            project_id: cluster.project_id,
            region: cluster.region,
            kube_api_ip: cluster.kube_api_ip,
            network_id: cluster.network_id,
            subnet_id: cluster.subnet_id,
            maintenance_window_start: cluster.maintenance_window_start,
            maintenance_window_end: cluster.maintenance_window_end,
            enable_autorepair: cluster.enable_autorepair,
            enable_patch_version_auto_upgrade: cluster.enable_patch_version_auto_upgrade,
            zonal: cluster.zonal,
            nodegroups,
        }
    }
}

struct ClusterRefresh<'a> {
    client: &'a MksClient,
    id: &'a str,
}

#[async_trait]
impl StateRefresh for ClusterRefresh<'_> {
    type Output = Cluster;
    type Error = MksError;

    async fn refresh(&self) -> Result<Observation<Cluster>> {
        let cluster = self.client.get_cluster(self.id).await?;
        let status = cluster.status.clone();
        Ok(Observation::new(cluster, status))
    }
}

struct ClusterDeletion<'a> {
    client: &'a MksClient,
    id: &'a str,
}

#[async_trait]
impl StateRefresh for ClusterDeletion<'_> {
    type Output = Cluster;
    type Error = MksError;

    async fn refresh(&self) -> Result<Observation<Cluster>> {
        let result = self.client.get_cluster(self.id).await.map_err(CloudError::from);
        Ok(deletion_observation(result)?)
    }
}

/// Handler for managed Kubernetes clusters and their nodegroups
pub struct ClusterHandler {
    timing: PollTiming,
}

impl Default for ClusterHandler {
    fn default() -> Self {
        Self {
            timing: PollTiming::new(Duration::from_secs(10), Duration::from_secs(3)),
        }
    }
}

impl ClusterHandler {
    pub fn with_timing(timing: PollTiming) -> Self {
        Self { timing }
    }

    async fn wait_for_active(&self, client: &MksClient, id: &str, timeout: Duration) -> Result<Cluster> {
        tracing::debug!(id, "Waiting for cluster to become ACTIVE");
        StateWaiter::new(id, PENDING, ACTIVE, timeout)
            .with_timing(self.timing)
            .wait(&ClusterRefresh { client, id })
            .await
            .map_err(|e| CloudError::waiting(OBJECT, id, e))?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn check_quotas(
        &self,
        ctx: &ProviderContext,
        spec: &ClusterSpec,
        new_cluster: bool,
        nodegroups: &[&NodegroupSpec],
    ) -> Result<()> {
        // Quotas are only readable through the resell API.
        if ctx.config().token.is_none() {
            tracing::debug!("Skipping quota checks without a Selectel token");
            return Ok(());
        }
        let quotas = ResellClient::from_context(ctx)?
            .project_quotas(&spec.project_id)
            .await?;

        if new_cluster {
            quota::check_cluster(&quotas, spec.region.as_str(), spec.zonal)?;
        }
        for nodegroup in nodegroups {
            quota::check_nodegroup(&quotas, &nodegroup.create_opts())?;
        }
        Ok(())
    }

    /// Create one nodegroup, wait for the cluster, and return the id the API
    /// assigned to it.
    async fn add_nodegroup(
        &self,
        client: &MksClient,
        cluster_id: &str,
        nodegroup: &NodegroupSpec,
        seen: &mut BTreeSet<String>,
        timeout: Duration,
    ) -> Result<Option<String>> {
        client
            .create_nodegroup(cluster_id, &nodegroup.create_opts())
            .await
            .map_err(|e| CloudError::creating(NODEGROUP_OBJECT, e))?;
        self.wait_for_active(client, cluster_id, timeout)
            .await
            .map_err(|e| CloudError::creating(NODEGROUP_OBJECT, e))?;
        self.claim_new_nodegroup(client, cluster_id, seen).await
    }

    async fn claim_new_nodegroup(
        &self,
        client: &MksClient,
        cluster_id: &str,
        seen: &mut BTreeSet<String>,
    ) -> Result<Option<String>> {
        let all = client
            .list_nodegroups(cluster_id)
            .await
            .map_err(|e| CloudError::getting(NODEGROUP_OBJECT, cluster_id, e))?;
        let new_id = all.into_iter().map(|ng| ng.id).find(|id| !seen.contains(id));
        if let Some(id) = &new_id {
            seen.insert(id.clone());
        }
        Ok(new_id)
    }

    async fn fetch(
        &self,
        client: &MksClient,
        id: &str,
        declared: &[NodegroupSpec],
    ) -> Result<Option<ClusterState>> {
        let cluster = match client.get_cluster(id).await {
            Ok(cluster) => cluster,
            Err(MksError::CloudError(err)) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(CloudError::getting(OBJECT, id, err).into()),
        };
        let nodegroups = client
            .list_nodegroups(id)
            .await
            .map_err(|e| CloudError::getting(NODEGROUP_OBJECT, id, e))?
            .into_iter()
            .map(|ng| NodegroupState::from_api(ng, declared))
            .collect();
        Ok(Some(ClusterState::new(cluster, nodegroups)))
    }

    /// Version flagged as default by the API, or the latest one.
    async fn default_kube_version(&self, client: &MksClient) -> Result<String> {
        let versions = client.list_kube_versions().await?;
        let version = match kube_version::default_version(&versions) {
            Some(version) => version,
            None => kube_version::latest_version(&versions)?.ok_or(MksError::NoKubeVersions)?,
        };
        tracing::debug!(version, "Using default kube version");
        Ok(kube_version::normalize(&version).to_string())
    }

    async fn upgrade_kube_version(
        &self,
        client: &MksClient,
        id: &str,
        current: &str,
        desired: &str,
        timeout: Duration,
    ) -> Result<()> {
        tracing::debug!(id, current, desired, "Checking kube version upgrade");
        let versions = client.list_kube_versions().await?;
        let latest_patches = kube_version::latest_patch_versions(&versions)?;

        match kube_version::plan_upgrade(current, desired, &latest_patches)? {
            UpgradeStep::Minor => client.upgrade_minor_version(id).await?,
            UpgradeStep::Patch => client.upgrade_patch_version(id).await?,
        }
        self.wait_for_active(client, id, timeout).await?;
        Ok(())
    }

    async fn reconcile_nodegroups(
        &self,
        ctx: &ProviderContext,
        client: &MksClient,
        id: &str,
        new: &ClusterSpec,
        plan: Plan<NodegroupSpec>,
        timeout: Duration,
    ) -> Result<Vec<NodegroupSpec>> {
        tracing::debug!(cluster = id, summary = %plan.summary(), "Nodegroup plan");

        let additions: Vec<&NodegroupSpec> = plan
            .actions_by_type(ActionType::Create)
            .into_iter()
            .map(|a| &a.item)
            .collect();
        if !additions.is_empty() {
            self.check_quotas(ctx, new, false, &additions).await?;
        }

        let mut seen: BTreeSet<String> = client
            .list_nodegroups(id)
            .await
            .map_err(|e| CloudError::getting(NODEGROUP_OBJECT, id, e))?
            .into_iter()
            .map(|ng| ng.id)
            .collect();
        let mut result = Vec::new();

        for action in plan.actions {
            let mut nodegroup = action.item;
            match action.action_type {
                ActionType::Create => {
                    nodegroup.id = self
                        .add_nodegroup(client, id, &nodegroup, &mut seen, timeout)
                        .await?;
                    result.push(nodegroup);
                }
                ActionType::Update => {
                    let nodegroup_id = nodegroup
                        .id
                        .clone()
                        .ok_or_else(|| MksError::MissingNodegroupId(nodegroup.name.clone()))?;
                    client
                        .resize_nodegroup(id, &nodegroup_id, nodegroup.count)
                        .await
                        .map_err(|e| CloudError::updating(NODEGROUP_OBJECT, &nodegroup_id, e))?;
                    self.wait_for_active(client, id, timeout)
                        .await
                        .map_err(|e| CloudError::updating(NODEGROUP_OBJECT, &nodegroup_id, e))?;
                    result.push(nodegroup);
                }
                ActionType::Delete => {
                    let nodegroup_id = nodegroup
                        .id
                        .as_deref()
                        .ok_or_else(|| MksError::MissingNodegroupId(nodegroup.name.clone()))?;
                    client
                        .delete_nodegroup(id, nodegroup_id)
                        .await
                        .map_err(|e| CloudError::deleting(NODEGROUP_OBJECT, nodegroup_id, e))?;
                    self.wait_for_active(client, id, timeout)
                        .await
                        .map_err(|e| CloudError::deleting(NODEGROUP_OBJECT, nodegroup_id, e))?;
                }
                ActionType::NoOp => result.push(nodegroup),
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl ResourceHandler for ClusterHandler {
    type Spec = ClusterSpec;
    type State = ClusterState;
    type Error = MksError;

    fn type_name(&self) -> &'static str {
        "selectel_mks_cluster_v1"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::uniform(Duration::from_secs(10 * 60))
    }

    fn scope(&self, spec: &ClusterSpec) -> Scope {
        Scope::new(spec.project_id.clone(), spec.region)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &ClusterSpec,
        timeouts: &Timeouts,
    ) -> Result<ClusterState> {
        spec.validate()?;
        let client = MksClient::for_scope(ctx, &self.scope(spec)).await?;
        let all_nodegroups: Vec<&NodegroupSpec> = spec.nodegroups.iter().collect();
        self.check_quotas(ctx, spec, true, &all_nodegroups).await?;

        let kube_version = match spec.kube_version.as_deref() {
            Some(version) => version.to_string(),
            None => self.default_kube_version(&client).await?,
        };
        let cluster = client
            .create_cluster(&spec.create_opts(&kube_version))
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        let id = cluster.id;
        self.wait_for_active(&client, &id, timeouts.create)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;

        // The first nodegroup comes with the cluster, the rest are added one by one.
        let mut seen = BTreeSet::new();
        let mut nodegroups = spec.nodegroups.clone();
        for (index, nodegroup) in nodegroups.iter_mut().enumerate() {
            nodegroup.id = if index == 0 {
                self.claim_new_nodegroup(&client, &id, &mut seen).await?
            } else {
                self.add_nodegroup(&client, &id, nodegroup, &mut seen, timeouts.create)
                    .await?
            };
        }

        self.fetch(&client, &id, &nodegroups)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.clone()).into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        scope: &Scope,
        declared: Option<&ClusterSpec>,
    ) -> Result<Option<ClusterState>> {
        let client = MksClient::for_scope(ctx, scope).await?;
        let declared = declared.map_or(&[][..], |spec| spec.nodegroups.as_slice());
        self.fetch(&client, id, declared).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &ClusterSpec,
        new: &ClusterSpec,
        timeouts: &Timeouts,
    ) -> Result<ClusterState> {
        if let Some(field) = old.replaced_field(new) {
            return Err(MksError::ForceNew(field));
        }
        new.validate()?;
        let plan = plan_nodegroups(&old.nodegroups, &new.nodegroups)?;
        let client = MksClient::for_scope(ctx, &self.scope(new)).await?;

        let opts = cluster_update_opts(old, new);
        if !opts.is_empty() {
            client
                .update_cluster(id, &opts)
                .await
                .map_err(|e| CloudError::updating(OBJECT, id, e))?;
            self.wait_for_active(&client, id, timeouts.update)
                .await
                .map_err(|e| CloudError::updating(OBJECT, id, e))?;
        }

        // An omitted version keeps whatever the cluster runs.
        if let Some(desired) = new.kube_version.as_deref() {
            let current = client
                .get_cluster(id)
                .await
                .map_err(|e| CloudError::getting(OBJECT, id, e))?
                .kube_version;
            if kube_version::normalize(&current) != kube_version::normalize(desired)
                && !kube_version::suppress_diff(&current, desired)
            {
                self.upgrade_kube_version(&client, id, &current, desired, timeouts.update)
                    .await
                    .map_err(|e| CloudError::updating(OBJECT, id, e))?;
            }
        }

        let nodegroups = self
            .reconcile_nodegroups(ctx, &client, id, new, plan, timeouts.update)
            .await?;

        self.fetch(&client, id, &nodegroups)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        spec: &ClusterSpec,
        timeouts: &Timeouts,
    ) -> Result<()> {
        let client = MksClient::for_scope(ctx, &self.scope(spec)).await?;
        match client.delete_cluster(id).await {
            Ok(()) => {}
            Err(MksError::CloudError(err)) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(CloudError::deleting(OBJECT, id, err).into()),
        }

        tracing::debug!(id, "Waiting for cluster to become deleted");
        StateWaiter::for_deletion(id, timeouts.delete)
            .with_timing(self.timing)
            .wait(&ClusterDeletion { client: &client, id })
            .await
            .map_err(|e| CloudError::deleting(OBJECT, id, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use selectel_config::RawConfig;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn nodegroup(name: &str, count: u32, id: Option<&str>) -> NodegroupSpec {
        NodegroupSpec {
            name: name.into(),
            availability_zone: "ru-3a".into(),
            count,
            keypair_name: None,
            affinity_policy: None,
            cpus: Some(2),
            ram_mb: Some(4096),
            volume_gb: Some(20),
            volume_type: Some("fast.ru-3a".into()),
            local_volume: false,
            flavor_id: None,
            labels: BTreeMap::new(),
            taints: vec![],
            id: id.map(str::to_string),
        }
    }

    fn spec(kube_version: &str, nodegroups: Vec<NodegroupSpec>) -> ClusterSpec {
        ClusterSpec {
            name: "demo".into(),
            project_id: "p-1".into(),
            region: Region::Ru3,
            kube_version: Some(kube_version.into()),
            nodegroups,
            enable_autorepair: true,
            enable_patch_version_auto_upgrade: true,
            network_id: None,
            subnet_id: None,
            maintenance_window_start: None,
            zonal: false,
        }
    }

    fn cluster_json(status: &str, kube_version: &str) -> serde_json::Value {
        json!({"cluster": {
            "id": "c-1", "name": "demo", "status": status, "project_id": "p-1",
            "kube_version": kube_version, "region": "ru-3",
            "enable_autorepair": true, "enable_patch_version_auto_upgrade": true
        }})
    }

    /// Context whose resell token endpoint and MKS endpoint both point at
    /// the mock server.
    fn context(server: &MockServer) -> ProviderContext {
        server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(201).json_body(json!({"token": {"id": "project-token"}}));
        });
        let config = RawConfig {
            token: Some("sel-token".into()),
            endpoint: Some(server.base_url()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        ProviderContext::new(config).with_endpoint_override("mks", server.base_url())
    }

    fn handler() -> ClusterHandler {
        ClusterHandler::with_timing(PollTiming::IMMEDIATE)
    }

    fn timeouts() -> Timeouts {
        Timeouts::uniform(Duration::from_secs(30))
    }

    #[test]
    fn test_spec_defaults_and_validation() {
        let parsed: ClusterSpec = serde_json::from_value(json!({
            "name": "demo", "project_id": "p-1", "region": "ru-9",
            "kube_version": "v1.16.9", "nodegroups": []
        }))
        .unwrap();
        assert!(parsed.enable_autorepair);
        assert!(parsed.enable_patch_version_auto_upgrade);
        assert!(matches!(parsed.validate(), Err(MksError::UnsupportedRegion(Region::Ru9))));

        let no_nodegroups = spec("1.16.9", vec![]);
        assert!(matches!(no_nodegroups.validate(), Err(MksError::NoNodegroups)));

        let twice = spec("1.16.9", vec![nodegroup("a", 1, None), nodegroup("a", 2, None)]);
        assert!(matches!(twice.validate(), Err(MksError::DuplicateNodegroup(ref name)) if name == "a"));

        let unversioned: ClusterSpec = serde_json::from_value(json!({
            "name": "demo", "project_id": "p-1", "region": "ru-3",
            "nodegroups": [{"name": "a", "availability_zone": "ru-3a", "count": 1}]
        }))
        .unwrap();
        assert_eq!(unversioned.kube_version, None);
        assert!(unversioned.validate().is_ok());
    }

    #[test]
    fn test_create_opts_carry_first_nodegroup_only() {
        let opts = spec("v1.16.9", vec![nodegroup("a", 1, None), nodegroup("b", 2, None)])
            .create_opts("v1.16.9");
        assert_eq!(opts.kube_version, "1.16.9");
        assert_eq!(opts.nodegroups.len(), 1);
        assert_eq!(opts.nodegroups[0].count, 1);
    }

    #[test]
    fn test_cluster_update_opts() {
        let old = spec("1.16.9", vec![]);
        let mut new = old.clone();
        new.enable_autorepair = false;
        new.maintenance_window_start = Some("01:00:00".into());

        let opts = cluster_update_opts(&old, &new);
        assert_eq!(opts.enable_autorepair, Some(false));
        assert_eq!(opts.maintenance_window_start.as_deref(), Some("01:00:00"));
        assert_eq!(opts.enable_patch_version_auto_upgrade, None);
        assert!(cluster_update_opts(&old, &old).is_empty());
    }

    #[tokio::test]
    async fn test_major_upgrade_rejected_without_call() {
        let server = MockServer::start();
        let ctx = context(&server);
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1");
            then.status(200).json_body(cluster_json("ACTIVE", "1.16.9"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/kubeversions");
            then.status(200).json_body(json!({"kube_versions": [
                {"version": "1.16.9"}, {"version": "2.0.0"}
            ]}));
        });
        let upgrade_minor = server.mock(|when, then| {
            when.method(POST).path("/clusters/c-1/upgrade-minor-version");
            then.status(200);
        });
        let upgrade_patch = server.mock(|when, then| {
            when.method(POST).path("/clusters/c-1/upgrade-patch-version");
            then.status(200);
        });

        let ngs = vec![nodegroup("a", 1, Some("ng-1"))];
        let err = handler()
            .update(
                &ctx,
                "c-1",
                &spec("1.16.9", ngs.clone()),
                &spec("2.0.0", ngs),
                &timeouts(),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("can't be upgraded to version 2.0.0"));
        upgrade_minor.assert_hits(0);
        upgrade_patch.assert_hits(0);
    }

    #[tokio::test]
    async fn test_patch_upgrade_and_resize() {
        let server = MockServer::start();
        let ctx = context(&server);
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1");
            then.status(200).json_body(cluster_json("ACTIVE", "1.16.8"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/kubeversions");
            then.status(200).json_body(json!({"kube_versions": [
                {"version": "1.16.8"}, {"version": "1.16.9", "is_default": true}
            ]}));
        });
        let upgrade = server.mock(|when, then| {
            when.method(POST).path("/clusters/c-1/upgrade-patch-version");
            then.status(200).json_body(cluster_json("PENDING_UPGRADE_PATCH_VERSION", "1.16.8"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1/nodegroups");
            then.status(200).json_body(json!({"nodegroups": [
                {"id": "ng-1", "availability_zone": "ru-3a", "nodes": [{"id": "n-1"}, {"id": "n-2"}, {"id": "n-3"}]}
            ]}));
        });
        let resize = server.mock(|when, then| {
            when.method(POST)
                .path("/clusters/c-1/nodegroups/ng-1/resize")
                .json_body(json!({"nodegroup": {"desired": 3}}));
            then.status(204);
        });

        let state = handler()
            .update(
                &ctx,
                "c-1",
                &spec("1.16.8", vec![nodegroup("workers", 1, Some("ng-1"))]),
                &spec("1.16.9", vec![nodegroup("workers", 3, None)]),
                &timeouts(),
            )
            .await
            .unwrap();

        upgrade.assert();
        resize.assert();
        assert_eq!(state.nodegroups.len(), 1);
        assert_eq!(state.nodegroups[0].name, "workers");
        assert_eq!(state.nodegroups[0].count, 3);
    }

    #[tokio::test]
    async fn test_lower_version_is_not_a_downgrade() {
        let server = MockServer::start();
        let ctx = context(&server);
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1");
            then.status(200).json_body(cluster_json("ACTIVE", "1.16.9"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1/nodegroups");
            then.status(200).json_body(json!({"nodegroups": [{"id": "ng-1"}]}));
        });
        let versions = server.mock(|when, then| {
            when.method(GET).path("/kubeversions");
            then.status(200).json_body(json!({"kube_versions": []}));
        });

        let ngs = vec![nodegroup("a", 1, Some("ng-1"))];
        let state = handler()
            .update(&ctx, "c-1", &spec("1.16.9", ngs.clone()), &spec("1.15.11", ngs), &timeouts())
            .await
            .unwrap();

        versions.assert_hits(0);
        assert_eq!(state.kube_version, "1.16.9");
    }

    #[tokio::test]
    async fn test_changed_nodegroup_rejected_before_calls() {
        let server = MockServer::start();
        let ctx = context(&server);
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1");
            then.status(200).json_body(cluster_json("ACTIVE", "1.16.9"));
        });
        let create = server.mock(|when, then| {
            when.method(POST).path("/clusters/c-1/nodegroups");
            then.status(204);
        });

        let mut changed = nodegroup("a", 1, None);
        changed.availability_zone = "ru-3b".into();
        let err = handler()
            .update(
                &ctx,
                "c-1",
                &spec("1.16.9", vec![nodegroup("a", 1, Some("ng-1"))]),
                &spec("1.16.9", vec![changed]),
                &timeouts(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MksError::NodegroupChanged { field: "availability_zone", .. }));
        create.assert_hits(0);
    }

    #[tokio::test]
    async fn test_update_rejects_force_new_fields() {
        let old = spec("1.16.9", vec![nodegroup("a", 1, None)]);
        let mut new = old.clone();
        new.name = "renamed".into();

        let config = RawConfig {
            token: Some("sel-token".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let err = handler()
            .update(&ProviderContext::new(config), "c-1", &old, &new, &timeouts())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "name cannot be changed without recreating the cluster"
        );
    }

    #[tokio::test]
    async fn test_read_missing_cluster_is_gone() {
        let server = MockServer::start();
        let ctx = context(&server);
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1");
            then.status(404);
        });

        let state = handler()
            .read(&ctx, "c-1", &Scope::new("p-1", Region::Ru3), None)
            .await
            .unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_delete_polls_until_not_found() {
        let server = MockServer::start();
        let ctx = context(&server);
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/clusters/c-1");
            then.status(204);
        });
        let get = server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1");
            then.status(404);
        });

        handler()
            .delete(&ctx, "c-1", &spec("1.16.9", vec![]), &timeouts())
            .await
            .unwrap();

        delete.assert();
        get.assert_hits(1);
    }

    #[tokio::test]
    async fn test_create_with_two_nodegroups() {
        let server = MockServer::start();
        let ctx = context(&server);
        server.mock(|when, then| {
            when.method(GET).path("/quotas/projects/p-1");
            then.status(200).json_body(json!({"quotas": {
                "mks_cluster_regional": [{"region": "ru-3", "value": 2, "used": 0}],
                "compute_cores": [{"region": "ru-3", "zone": "ru-3a", "value": 32, "used": 0}],
                "compute_ram": [{"region": "ru-3", "zone": "ru-3a", "value": 65536, "used": 0}],
                "volume_gigabytes_fast": [{"region": "ru-3", "zone": "ru-3a", "value": 500, "used": 0}]
            }}));
        });
        let create_cluster = server.mock(|when, then| {
            when.method(POST)
                .path("/clusters")
                .header("X-Auth-Token", "project-token")
                .body_contains("\"count\":1");
            then.status(200).json_body(cluster_json("PENDING_CREATE", "1.16.9"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1");
            then.status(200).json_body(cluster_json("ACTIVE", "1.16.9"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1/nodegroups");
            then.status(200)
                .json_body(json!({"nodegroups": [{"id": "ng-1"}, {"id": "ng-2"}]}));
        });
        let create_nodegroup = server.mock(|when, then| {
            when.method(POST)
                .path("/clusters/c-1/nodegroups")
                .body_contains("\"count\":2");
            then.status(204);
        });

        let declared = spec("1.16.9", vec![nodegroup("first", 1, None), nodegroup("second", 2, None)]);
        let state = handler().create(&ctx, &declared, &timeouts()).await.unwrap();

        create_cluster.assert();
        create_nodegroup.assert();
        let names: Vec<_> = state
            .nodegroups
            .iter()
            .map(|ng| (ng.id.as_str(), ng.name.as_str()))
            .collect();
        assert_eq!(names, [("ng-1", "first"), ("ng-2", "second")]);
    }

    #[tokio::test]
    async fn test_create_without_version_uses_default() {
        let server = MockServer::start();
        let ctx = context(&server);
        server.mock(|when, then| {
            when.method(GET).path("/quotas/projects/p-1");
            then.status(200).json_body(json!({"quotas": {
                "mks_cluster_regional": [{"region": "ru-3", "value": 2, "used": 0}],
                "compute_cores": [{"region": "ru-3", "zone": "ru-3a", "value": 32, "used": 0}],
                "compute_ram": [{"region": "ru-3", "zone": "ru-3a", "value": 65536, "used": 0}],
                "volume_gigabytes_fast": [{"region": "ru-3", "zone": "ru-3a", "value": 500, "used": 0}]
            }}));
        });
        let versions = server.mock(|when, then| {
            when.method(GET).path("/kubeversions");
            then.status(200).json_body(json!({"kube_versions": [
                {"version": "1.16.9", "is_default": true}, {"version": "1.17.4"}
            ]}));
        });
        let create_cluster = server.mock(|when, then| {
            when.method(POST)
                .path("/clusters")
                .body_contains("\"kube_version\":\"1.16.9\"");
            then.status(200).json_body(cluster_json("PENDING_CREATE", "1.16.9"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1");
            then.status(200).json_body(cluster_json("ACTIVE", "1.16.9"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1/nodegroups");
            then.status(200).json_body(json!({"nodegroups": [{"id": "ng-1"}]}));
        });

        let mut declared = spec("1.16.9", vec![nodegroup("first", 1, None)]);
        declared.kube_version = None;
        let state = handler().create(&ctx, &declared, &timeouts()).await.unwrap();

        versions.assert();
        create_cluster.assert();
        assert_eq!(state.kube_version, "1.16.9");
    }

    #[tokio::test]
    async fn test_duplicate_old_nodegroup_rejected_before_calls() {
        let server = MockServer::start();
        let ctx = context(&server);
        let get = server.mock(|when, then| {
            when.method(GET).path("/clusters/c-1");
            then.status(200).json_body(cluster_json("ACTIVE", "1.16.9"));
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path_contains("/clusters/c-1/nodegroups/");
            then.status(204);
        });

        let old = vec![nodegroup("a", 1, Some("ng-1")), nodegroup("a", 1, Some("ng-2"))];
        let err = handler()
            .update(
                &ctx,
                "c-1",
                &spec("1.16.9", old),
                &spec("1.16.9", vec![nodegroup("a", 1, None)]),
                &timeouts(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MksError::DuplicateNodegroup(ref name) if name == "a"));
        get.assert_hits(0);
        delete.assert_hits(0);
    }

    #[tokio::test]
    async fn test_duplicate_new_nodegroup_rejected_before_calls() {
        let server = MockServer::start();
        let ctx = context(&server);
        let create = server.mock(|when, then| {
            when.method(POST).path("/clusters/c-1/nodegroups");
            then.status(204);
        });

        let err = handler()
            .update(
                &ctx,
                "c-1",
                &spec("1.16.9", vec![nodegroup("a", 1, Some("ng-1"))]),
                &spec("1.16.9", vec![nodegroup("b", 1, None), nodegroup("b", 1, None)]),
                &timeouts(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MksError::DuplicateNodegroup(ref name) if name == "b"));
        create.assert_hits(0);
    }

    #[tokio::test]
    async fn test_removing_nodegroup_without_id_fails() {
        let server = MockServer::start();
        let ctx = context(&server);
        let create = server.mock(|when, then| {
            when.method(POST).path("/clusters/c-1/nodegroups");
            then.status(204);
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path_contains("/clusters/c-1/nodegroups/");
            then.status(204);
        });

        let old = vec![nodegroup("a", 1, Some("ng-1")), nodegroup("b", 1, None)];
        let new = vec![nodegroup("a", 1, None), nodegroup("c", 1, None)];
        let err = handler()
            .update(&ctx, "c-1", &spec("1.16.9", old), &spec("1.16.9", new), &timeouts())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "nodegroup 'b' has no id, refresh the cluster before changing it"
        );
        create.assert_hits(0);
        delete.assert_hits(0);
    }
}
