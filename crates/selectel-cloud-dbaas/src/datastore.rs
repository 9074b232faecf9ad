//! `selectel_dbaas_{postgresql,mysql,redis,kafka}_datastore_v1`
//!
//! One handler serves all four datastore resource types; the engine family
//! decides which datastore types are accepted and how a resize is sent.
//!
//! Updates are applied one aspect at a time, in a fixed order, and each
//! call is followed by a wait for the datastore to become `ACTIVE` again:
//!
//! 1. name
//! 2. firewall
//! 3. node count and flavor (resize)
//! 4. config
//! 5. Redis password
//! 6. backup retention
//! 7. floating IPs

use crate::client::{
    Datastore, DatastoreCreateOpts, DbaasClient, Flavor, FloatingIps, ResizeOpts, Restore,
};
use crate::engine::{Family, validate_datastore_type};
use crate::error::{DbaasError, Result};
use crate::floating_ip::{FloatingIpStep, plan_floating_ips};
use crate::status::{Kind, Polling, delete_and_wait, fetch, wait_for_active};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use selectel_config::Region;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

const OBJECT: &str = "datastore";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firewall {
    pub ips: Vec<String>,
}

/// Declared datastore
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatastoreSpec {
    pub name: String,
    pub project_id: String,
    pub region: Region,
    pub subnet_id: String,
    pub type_id: String,
    pub node_count: u32,
    #[serde(default)]
    pub flavor_id: Option<String>,
    #[serde(default)]
    pub flavor: Option<Flavor>,
    #[serde(default)]
    pub firewall: Option<Firewall>,
    #[serde(default)]
    pub restore: Option<Restore>,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    #[serde(default)]
    pub backup_retention_days: Option<u32>,
    #[serde(default)]
    pub floating_ips: Option<FloatingIps>,
    #[serde(default)]
    pub redis_password: Option<String>,
}

impl DatastoreSpec {
    fn validate(&self, family: Family) -> Result<()> {
        let invalid = |message: &str| Err(DbaasError::Invalid(message.to_string()));
        match family {
            Family::Redis => {
                if self.redis_password.is_none() {
                    return invalid("redis_password is required for Redis datastores");
                }
                if self.flavor_id.is_none() {
                    return invalid("flavor_id is required for Redis datastores");
                }
                if self.flavor.is_some() {
                    return invalid("flavor is not supported for Redis datastores, use flavor_id");
                }
            }
            _ => {
                if self.redis_password.is_some() {
                    return invalid("redis_password is only supported for Redis datastores");
                }
                if self.flavor_id.is_none() && self.flavor.is_none() {
                    return invalid("either flavor_id or flavor must be specified");
                }
            }
        }

        if let Some(target_time) = self.restore.as_ref().and_then(|r| r.target_time.as_deref()) {
            chrono::DateTime::parse_from_rfc3339(target_time).map_err(|source| {
                DbaasError::InvalidRestoreTime {
                    value: target_time.to_string(),
                    source,
                }
            })?;
        }

        if let Some(ips) = self.floating_ips {
            if ips.master < 0 || ips.replica < 0 {
                return invalid("floating IPs counts could not be less than 0");
            }
            if ips.master > 1 {
                return invalid("floating IPs count for MASTER could not be greater than 1");
            }
        }
        Ok(())
    }

    fn replaced_field(&self, new: &DatastoreSpec) -> Option<&'static str> {
        [
            ("project_id", self.project_id != new.project_id),
            ("region", self.region != new.region),
            ("subnet_id", self.subnet_id != new.subnet_id),
            ("type_id", self.type_id != new.type_id),
            ("restore", self.restore != new.restore),
        ]
        .into_iter()
        .find_map(|(field, changed)| changed.then_some(field))
    }

    fn create_opts(&self) -> DatastoreCreateOpts {
        DatastoreCreateOpts {
            name: self.name.clone(),
            type_id: self.type_id.clone(),
            subnet_id: self.subnet_id.clone(),
            node_count: self.node_count,
            flavor_id: self.flavor_id.clone(),
            flavor: self.flavor,
            restore: self.restore.clone(),
            config: self.config.clone(),
            backup_retention_days: self.backup_retention_days,
            floating_ips: self.floating_ips,
            redis_password: self.redis_password.clone(),
        }
    }

    fn resize_opts(&self, family: Family) -> ResizeOpts {
        ResizeOpts {
            node_count: self.node_count,
            flavor_id: self.flavor_id.clone(),
            // Redis flavors are addressed by id only.
            flavor: if family == Family::Redis { None } else { self.flavor },
        }
    }
}

/// Declared config plus `null` for every live parameter no longer declared.
pub fn config_changes(
    live: &BTreeMap<String, Value>,
    declared: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut changes = declared.clone();
    for key in live.keys() {
        changes.entry(key.clone()).or_insert(Value::Null);
    }
    changes
}

/// Config value as the string the host stores.
pub fn config_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceState {
    pub role: String,
    pub floating_ip: String,
}

/// Observed datastore
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatastoreState {
    pub id: String,
    pub name: String,
    pub status: String,
    pub project_id: String,
    pub region: Option<Region>,
    pub subnet_id: String,
    pub type_id: String,
    pub node_count: u32,
    pub enabled: bool,
    pub flavor_id: String,
    pub flavor: Flavor,
    pub backup_retention_days: u32,
    pub connections: BTreeMap<String, String>,
    pub instances: Vec<InstanceState>,
    pub config: BTreeMap<String, String>,
}

impl Identified for DatastoreState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl DatastoreState {
    fn new(datastore: Datastore, region: Option<Region>) -> Self {
        let instances = datastore
            .instances
            .iter()
            .map(|i| InstanceState {
                role: i.role.clone(),
                floating_ip: i.floating_ip().unwrap_or_default().to_string(),
            })
            .collect();
        let config = datastore
            .config
            .iter()
            .map(|(k, v)| (k.clone(), config_value_to_string(v)))
            .collect();
        Self {
            id: datastore.id,
            name: datastore.name,
            status: datastore.status,
            project_id: datastore.project_id,
            region,
            subnet_id: datastore.subnet_id,
            type_id: datastore.type_id,
            node_count: datastore.node_count,
            enabled: datastore.enabled,
            flavor_id: datastore.flavor_id,
            flavor: datastore.flavor,
            backup_retention_days: datastore.backup_retention_days,
            connections: datastore.connection,
            instances,
            config,
        }
    }
}

/// Handler for one datastore engine family
pub struct DatastoreHandler {
    family: Family,
    polling: Polling,
}

impl DatastoreHandler {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            polling: Kind::Datastore.polling(),
        }
    }

    pub fn with_polling(mut self, polling: Polling) -> Self {
        self.polling = polling;
        self
    }

    async fn settle(&self, client: &DbaasClient, id: &str, timeout: Duration) -> Result<Datastore> {
        wait_for_active(client, Kind::Datastore, id, timeout, self.polling.active).await
    }

    /// Run one update call and wait for the datastore to settle.
    async fn apply<F>(&self, client: &DbaasClient, id: &str, timeout: Duration, step: &str, call: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        tracing::debug!(id, step, "Updating datastore");
        call.await
            .map_err(|e| CloudError::updating(OBJECT, id, e))?;
        self.settle(client, id, timeout)
            .await
            .map_err(|e| CloudError::updating(OBJECT, id, e))?;
        Ok(())
    }

    async fn update_floating_ips(
        &self,
        client: &DbaasClient,
        id: &str,
        desired: &FloatingIps,
        timeout: Duration,
    ) -> Result<()> {
        let live = client
            .datastore(id)
            .await
            .map_err(|e| CloudError::getting(OBJECT, id, e))?;
        let steps = plan_floating_ips(&live, desired)?;
        tracing::debug!(id, steps = steps.len(), "Floating IP plan");

        for step in steps {
            match &step {
                FloatingIpStep::Attach { role, instance_id } => {
                    tracing::debug!(id, role, instance_id, "Attaching floating IP");
                    self.apply(client, id, timeout, "floating_ips", client.attach_floating_ip(instance_id))
                        .await?;
                }
                FloatingIpStep::Detach { role, instance_id } => {
                    tracing::debug!(id, role, instance_id, "Detaching floating IP");
                    self.apply(client, id, timeout, "floating_ips", client.detach_floating_ip(instance_id))
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn state(&self, client: &DbaasClient, id: &str, region: Option<Region>) -> Result<Option<DatastoreState>> {
        Ok(fetch::<Datastore>(client, Kind::Datastore, id)
            .await?
            .map(|datastore| DatastoreState::new(datastore, region)))
    }
}

#[async_trait]
impl ResourceHandler for DatastoreHandler {
    type Spec = DatastoreSpec;
    type State = DatastoreState;
    type Error = DbaasError;

    fn type_name(&self) -> &'static str {
        match self.family {
            Family::PostgreSql => "selectel_dbaas_postgresql_datastore_v1",
            Family::MySql => "selectel_dbaas_mysql_datastore_v1",
            Family::Redis => "selectel_dbaas_redis_datastore_v1",
            Family::Kafka => "selectel_dbaas_kafka_datastore_v1",
        }
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::uniform(Duration::from_secs(60 * 60))
    }

    fn scope(&self, spec: &DatastoreSpec) -> Scope {
        Scope::new(spec.project_id.clone(), spec.region)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &DatastoreSpec,
        timeouts: &Timeouts,
    ) -> Result<DatastoreState> {
        spec.validate(self.family)?;
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        validate_datastore_type(&client, self.family, &spec.type_id).await?;

        let datastore: Datastore = client
            .create(Kind::Datastore, &spec.create_opts())
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        let id = datastore.id;
        self.settle(&client, &id, timeouts.create)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;

        self.state(&client, &id, Some(spec.region))
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.clone()).into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        scope: &Scope,
        _declared: Option<&DatastoreSpec>,
    ) -> Result<Option<DatastoreState>> {
        let client = DbaasClient::for_scope(ctx, scope).await?;
        self.state(&client, id, scope.region).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &DatastoreSpec,
        new: &DatastoreSpec,
        timeouts: &Timeouts,
    ) -> Result<DatastoreState> {
        if let Some(field) = old.replaced_field(new) {
            return Err(DbaasError::ForceNew(field));
        }
        new.validate(self.family)?;
        let client = DbaasClient::for_scope(ctx, &self.scope(new)).await?;
        let _lock = ctx.locks().lock(id).await;
        let timeout = timeouts.update;

        if old.name != new.name {
            let changes = json!({"name": new.name});
            self.apply(&client, id, timeout, "name", client.update(Kind::Datastore, id, &changes))
                .await?;
        }

        if old.firewall != new.firewall {
            let ips = new.firewall.as_ref().map(|f| f.ips.clone()).unwrap_or_default();
            self.apply(&client, id, timeout, "firewall", client.update_firewall(id, &ips))
                .await?;
        }

        if old.node_count != new.node_count || old.flavor_id != new.flavor_id || old.flavor != new.flavor {
            let opts = new.resize_opts(self.family);
            self.apply(&client, id, timeout, "resize", client.resize_datastore(id, &opts))
                .await?;
        }

        if old.config != new.config {
            let live = client
                .datastore(id)
                .await
                .map_err(|e| CloudError::getting(OBJECT, id, e))?;
            let config = config_changes(&live.config, &new.config);
            self.apply(&client, id, timeout, "config", client.update_config(id, &config))
                .await?;
        }

        if old.redis_password != new.redis_password {
            if let Some(password) = new.redis_password.as_deref() {
                self.apply(&client, id, timeout, "redis_password", client.update_redis_password(id, password))
                    .await?;
            }
        }

        if old.backup_retention_days != new.backup_retention_days {
            if let Some(days) = new.backup_retention_days {
                self.apply(&client, id, timeout, "backups", client.update_backups(id, days))
                    .await?;
            }
        }

        if old.floating_ips != new.floating_ips {
            let desired = new.floating_ips.unwrap_or_default();
            self.update_floating_ips(&client, id, &desired, timeout).await?;
        }

        self.state(&client, id, Some(new.region))
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        spec: &DatastoreSpec,
        timeouts: &Timeouts,
    ) -> Result<()> {
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock(id).await;
        delete_and_wait(&client, Kind::Datastore, id, timeouts.delete, self.polling.deletion).await
    }
}
