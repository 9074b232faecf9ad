//! DBaaS v1 API client

use crate::error::{DbaasError, Result};
use crate::status::Kind;
use selectel_cloud::{CloudError, HEADER_X_AUTH_TOKEN, ProviderContext, Scope, ServiceClient};
use selectel_cloud_vpc::project_token;
use selectel_config::Region;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub vcpus: u32,
    pub ram: u32,
    pub disk: u32,
}

/// Floating IP counts per instance role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIps {
    pub master: i32,
    pub replica: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restore {
    pub datastore_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Instance {
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub floating_ip: Option<String>,
}

impl Instance {
    pub fn floating_ip(&self) -> Option<&str> {
        self.floating_ip.as_deref().filter(|ip| !ip.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Datastore {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub type_id: String,
    #[serde(default)]
    pub node_count: u32,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub flavor_id: String,
    #[serde(default)]
    pub flavor: Flavor,
    #[serde(default)]
    pub backup_retention_days: u32,
    #[serde(default)]
    pub connection: BTreeMap<String, String>,
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatastoreType {
    pub id: String,
    pub engine: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatastoreCreateOpts {
    pub name: String,
    pub type_id: String,
    pub subnet_id: String,
    pub node_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<Flavor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore: Option<Restore>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_retention_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floating_ips: Option<FloatingIps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResizeOpts {
    pub node_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<Flavor>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Database {
    pub id: String,
    pub datastore_id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub lc_collate: Option<String>,
    #[serde(default)]
    pub lc_ctype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseCreateOpts {
    pub datastore_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lc_collate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lc_ctype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct User {
    pub id: String,
    pub datastore_id: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserCreateOpts {
    pub datastore_id: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogicalReplicationSlot {
    pub id: String,
    pub datastore_id: String,
    pub database_id: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotCreateOpts {
    pub datastore_id: String,
    pub database_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Topic {
    pub id: String,
    pub datastore_id: String,
    pub name: String,
    pub partitions: u32,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicCreateOpts {
    pub datastore_id: String,
    pub name: String,
    pub partitions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Literal,
    Prefixed,
    All,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Acl {
    pub id: String,
    pub datastore_id: String,
    pub user_id: String,
    #[serde(default)]
    pub pattern: Option<String>,
    pub pattern_type: PatternType,
    pub allow_read: bool,
    pub allow_write: bool,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AclCreateOpts {
    pub datastore_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub pattern_type: PatternType,
    pub allow_read: bool,
    pub allow_write: bool,
}

fn envelope<B: Serialize + ?Sized>(key: &str, body: &B) -> Result<Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), serde_json::to_value(body).map_err(CloudError::from)?);
    Ok(Value::Object(map))
}

fn open_envelope<T: DeserializeOwned>(key: &str, mut body: Value) -> Result<T> {
    let inner = body
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| CloudError::Validation(format!("response has no '{key}' object")))?;
    Ok(serde_json::from_value(inner).map_err(CloudError::from)?)
}

/// DBaaS v1 client bound to one region and project token
#[derive(Debug, Clone)]
pub struct DbaasClient {
    client: ServiceClient,
}

impl DbaasClient {
    pub fn new(http: reqwest::Client, endpoint: &str, token: &str) -> Self {
        Self {
            client: ServiceClient::new(http, endpoint, HEADER_X_AUTH_TOKEN, token),
        }
    }

    pub fn endpoint_for(region: Region) -> String {
        format!("https://{region}.dbaas.selcloud.ru/v1")
    }

    /// Client for the scope's region, authenticated with a project token.
    pub async fn for_scope(ctx: &ProviderContext, scope: &Scope) -> Result<Self> {
        let (Some(project_id), Some(region)) = (scope.project_id.as_deref(), scope.region) else {
            return Err(DbaasError::MissingScope);
        };
        let token = project_token(ctx, project_id).await?;
        let endpoint = ctx
            .endpoint_override("dbaas")
            .map(str::to_string)
            .unwrap_or_else(|| Self::endpoint_for(region));
        Ok(Self::new(ctx.http().clone(), &endpoint, &token))
    }

    pub async fn get<T: DeserializeOwned>(&self, kind: Kind, id: &str) -> Result<T> {
        tracing::debug!(object = kind.object(), id, "Getting");
        let body: Value = self
            .client
            .get(&format!("{}/{id}", kind.collection()))
            .await?;
        open_envelope(kind.envelope(), body)
    }

    pub async fn create<B, T>(&self, kind: Kind, opts: &B) -> Result<T>
    where
        B: Serialize + std::fmt::Debug + Sync,
        T: DeserializeOwned,
    {
        tracing::info!(object = kind.object(), ?opts, "Creating");
        let body: Value = self
            .client
            .post(kind.collection(), &envelope(kind.envelope(), opts)?)
            .await?;
        open_envelope(kind.envelope(), body)
    }

    /// `PUT {collection}/{id}` with the changed fields.
    pub async fn update(&self, kind: Kind, id: &str, changes: &Value) -> Result<()> {
        tracing::info!(object = kind.object(), id, %changes, "Updating");
        self.client
            .put_unit(
                &format!("{}/{id}", kind.collection()),
                &envelope(kind.envelope(), changes)?,
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, kind: Kind, id: &str) -> Result<()> {
        tracing::info!(object = kind.object(), id, "Deleting");
        self.client
            .delete(&format!("{}/{id}", kind.collection()))
            .await?;
        Ok(())
    }

    pub async fn datastore(&self, id: &str) -> Result<Datastore> {
        self.get(Kind::Datastore, id).await
    }

    pub async fn datastore_type(&self, id: &str) -> Result<DatastoreType> {
        tracing::debug!(id, "Getting datastore type");
        let body: Value = self.client.get(&format!("datastore-types/{id}")).await?;
        open_envelope("datastore-type", body)
    }

    pub async fn update_firewall(&self, id: &str, ips: &[String]) -> Result<()> {
        tracing::info!(id, ?ips, "Updating datastore firewall");
        self.client
            .put_unit(
                &format!("datastores/{id}/firewall"),
                &json!({"firewall": {"ips": ips}}),
            )
            .await?;
        Ok(())
    }

    pub async fn resize_datastore(&self, id: &str, opts: &ResizeOpts) -> Result<()> {
        tracing::info!(id, ?opts, "Resizing datastore");
        self.client
            .post_unit(&format!("datastores/{id}/resize"), &envelope("resize", opts)?)
            .await?;
        Ok(())
    }

    /// Replace the datastore configuration; `null` values reset a parameter.
    pub async fn update_config(&self, id: &str, config: &BTreeMap<String, Value>) -> Result<()> {
        tracing::info!(id, ?config, "Updating datastore config");
        self.client
            .put_unit(&format!("datastores/{id}/config"), &envelope("config", config)?)
            .await?;
        Ok(())
    }

    pub async fn update_redis_password(&self, id: &str, password: &str) -> Result<()> {
        tracing::info!(id, "Updating datastore password");
        self.client
            .put_unit(
                &format!("datastores/{id}/password"),
                &json!({"password": {"redis_password": password}}),
            )
            .await?;
        Ok(())
    }

    pub async fn update_backups(&self, id: &str, retention_days: u32) -> Result<()> {
        tracing::info!(id, retention_days, "Updating datastore backups");
        self.client
            .put_unit(
                &format!("datastores/{id}/backups"),
                &json!({"backups": {"backup_retention_days": retention_days}}),
            )
            .await?;
        Ok(())
    }

    pub async fn attach_floating_ip(&self, instance_id: &str) -> Result<()> {
        tracing::info!(instance_id, "Creating floating IP");
        self.client
            .post_unit(
                "floating-ips",
                &json!({"floating-ip": {"instance_id": instance_id}}),
            )
            .await?;
        Ok(())
    }

    pub async fn detach_floating_ip(&self, instance_id: &str) -> Result<()> {
        tracing::info!(instance_id, "Deleting floating IP");
        self.client
            .delete_with_body(
                "floating-ips",
                &json!({"floating-ip": {"instance_id": instance_id}}),
            )
            .await?;
        Ok(())
    }
}
