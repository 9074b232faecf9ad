//! Kafka topics and ACLs: `selectel_dbaas_topic_v1` and `selectel_dbaas_acl_v1`

use crate::client::{Acl, AclCreateOpts, DbaasClient, PatternType, Topic, TopicCreateOpts};
use crate::engine::{Family, validate_parent_datastore};
use crate::error::{DbaasError, Result};
use crate::status::{Kind, Polling, delete_and_wait, fetch, wait_for_active};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use selectel_config::Region;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

fn first_replaced<const N: usize>(fields: [(&'static str, bool); N]) -> Option<&'static str> {
    fields
        .into_iter()
        .find_map(|(field, changed)| changed.then_some(field))
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopicSpec {
    pub project_id: String,
    pub region: Region,
    pub datastore_id: String,
    pub name: String,
    pub partitions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicState {
    pub id: String,
    pub datastore_id: String,
    pub name: String,
    pub partitions: u32,
    pub status: String,
}

impl Identified for TopicState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<Topic> for TopicState {
    fn from(topic: Topic) -> Self {
        Self {
            id: topic.id,
            datastore_id: topic.datastore_id,
            name: topic.name,
            partitions: topic.partitions,
            status: topic.status,
        }
    }
}

pub struct TopicHandler {
    polling: Polling,
}

impl Default for TopicHandler {
    fn default() -> Self {
        Self {
            polling: Kind::Topic.polling(),
        }
    }
}

impl TopicHandler {
    pub fn with_polling(polling: Polling) -> Self {
        Self { polling }
    }

    fn validate(spec: &TopicSpec) -> Result<()> {
        if spec.partitions == 0 {
            return Err(DbaasError::Invalid("partitions must be at least 1".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceHandler for TopicHandler {
    type Spec = TopicSpec;
    type State = TopicState;
    type Error = DbaasError;

    fn type_name(&self) -> &'static str {
        "selectel_dbaas_topic_v1"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::uniform(Duration::from_secs(30 * 60))
    }

    fn scope(&self, spec: &TopicSpec) -> Scope {
        Scope::new(spec.project_id.clone(), spec.region)
    }

    async fn create(&self, ctx: &ProviderContext, spec: &TopicSpec, timeouts: &Timeouts) -> Result<TopicState> {
        Self::validate(spec)?;
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock(&spec.datastore_id).await;
        validate_parent_datastore(&client, Family::Kafka, &spec.datastore_id).await?;

        let opts = TopicCreateOpts {
            datastore_id: spec.datastore_id.clone(),
            name: spec.name.clone(),
            partitions: spec.partitions,
        };
        let topic: Topic = client
            .create(Kind::Topic, &opts)
            .await
            .map_err(|e| CloudError::creating("topic", e))?;
        let topic: Topic = wait_for_active(&client, Kind::Topic, &topic.id, timeouts.create, self.polling.active)
            .await
            .map_err(|e| CloudError::creating("topic", e))?;
        Ok(topic.into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        scope: &Scope,
        _declared: Option<&TopicSpec>,
    ) -> Result<Option<TopicState>> {
        let client = DbaasClient::for_scope(ctx, scope).await?;
        Ok(fetch::<Topic>(&client, Kind::Topic, id).await?.map(Into::into))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &TopicSpec,
        new: &TopicSpec,
        timeouts: &Timeouts,
    ) -> Result<TopicState> {
        let replaced = first_replaced([
            ("project_id", old.project_id != new.project_id),
            ("region", old.region != new.region),
            ("datastore_id", old.datastore_id != new.datastore_id),
            ("name", old.name != new.name),
        ]);
        if let Some(field) = replaced {
            return Err(DbaasError::ForceNew(field));
        }
        Self::validate(new)?;
        // Kafka cannot drop partitions from an existing topic.
        if new.partitions < old.partitions {
            return Err(DbaasError::Invalid(format!(
                "partitions can only be increased: {} -> {}",
                old.partitions, new.partitions
            )));
        }

        let client = DbaasClient::for_scope(ctx, &self.scope(new)).await?;
        if new.partitions != old.partitions {
            let _lock = ctx.locks().lock(&new.datastore_id).await;
            client
                .update(Kind::Topic, id, &json!({"partitions": new.partitions}))
                .await
                .map_err(|e| CloudError::updating("topic", id, e))?;
            wait_for_active::<Topic>(&client, Kind::Topic, id, timeouts.update, self.polling.active)
                .await
                .map_err(|e| CloudError::updating("topic", id, e))?;
        }

        fetch::<Topic>(&client, Kind::Topic, id)
            .await?
            .map(Into::into)
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, spec: &TopicSpec, timeouts: &Timeouts) -> Result<()> {
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock(&spec.datastore_id).await;
        delete_and_wait(&client, Kind::Topic, id, timeouts.delete, self.polling.deletion).await
    }
}

// ---------------------------------------------------------------------------
// ACLs
// ---------------------------------------------------------------------------

/// Declared access rule of a Kafka user
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AclSpec {
    pub project_id: String,
    pub region: Region,
    pub datastore_id: String,
    pub user_id: String,
    #[serde(default)]
    pub pattern: Option<String>,
    pub pattern_type: PatternType,
    pub allow_read: bool,
    pub allow_write: bool,
}

impl AclSpec {
    /// `all` matches every topic and takes no pattern; the other types need one.
    pub fn validate(&self) -> Result<()> {
        let has_pattern = self.pattern.as_deref().is_some_and(|p| !p.is_empty());
        match self.pattern_type {
            PatternType::All if has_pattern => Err(DbaasError::Invalid(
                "pattern must not be set when pattern_type is 'all'".into(),
            )),
            PatternType::Literal | PatternType::Prefixed if !has_pattern => Err(DbaasError::Invalid(
                "pattern is required when pattern_type is 'literal' or 'prefixed'".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AclState {
    pub id: String,
    pub datastore_id: String,
    pub user_id: String,
    pub pattern: Option<String>,
    pub pattern_type: PatternType,
    pub allow_read: bool,
    pub allow_write: bool,
    pub status: String,
}

impl Identified for AclState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<Acl> for AclState {
    fn from(acl: Acl) -> Self {
        Self {
            id: acl.id,
            datastore_id: acl.datastore_id,
            user_id: acl.user_id,
            pattern: acl.pattern.filter(|p| !p.is_empty()),
            pattern_type: acl.pattern_type,
            allow_read: acl.allow_read,
            allow_write: acl.allow_write,
            status: acl.status,
        }
    }
}

pub struct AclHandler {
    polling: Polling,
}

impl Default for AclHandler {
    fn default() -> Self {
        Self {
            polling: Kind::Acl.polling(),
        }
    }
}

impl AclHandler {
    pub fn with_polling(polling: Polling) -> Self {
        Self { polling }
    }
}

#[async_trait]
impl ResourceHandler for AclHandler {
    type Spec = AclSpec;
    type State = AclState;
    type Error = DbaasError;

    fn type_name(&self) -> &'static str {
        "selectel_dbaas_acl_v1"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::uniform(Duration::from_secs(30 * 60))
    }

    fn scope(&self, spec: &AclSpec) -> Scope {
        Scope::new(spec.project_id.clone(), spec.region)
    }

    async fn create(&self, ctx: &ProviderContext, spec: &AclSpec, timeouts: &Timeouts) -> Result<AclState> {
        spec.validate()?;
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock(&spec.datastore_id).await;
        validate_parent_datastore(&client, Family::Kafka, &spec.datastore_id).await?;

        let opts = AclCreateOpts {
            datastore_id: spec.datastore_id.clone(),
            user_id: spec.user_id.clone(),
            pattern: spec.pattern.clone(),
            pattern_type: spec.pattern_type,
            allow_read: spec.allow_read,
            allow_write: spec.allow_write,
        };
        let acl: Acl = client
            .create(Kind::Acl, &opts)
            .await
            .map_err(|e| CloudError::creating("acl", e))?;
        let acl: Acl = wait_for_active(&client, Kind::Acl, &acl.id, timeouts.create, self.polling.active)
            .await
            .map_err(|e| CloudError::creating("acl", e))?;
        Ok(acl.into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        scope: &Scope,
        _declared: Option<&AclSpec>,
    ) -> Result<Option<AclState>> {
        let client = DbaasClient::for_scope(ctx, scope).await?;
        Ok(fetch::<Acl>(&client, Kind::Acl, id).await?.map(Into::into))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &AclSpec,
        new: &AclSpec,
        timeouts: &Timeouts,
    ) -> Result<AclState> {
        let replaced = first_replaced([
            ("project_id", old.project_id != new.project_id),
            ("region", old.region != new.region),
            ("datastore_id", old.datastore_id != new.datastore_id),
            ("user_id", old.user_id != new.user_id),
            ("pattern", old.pattern != new.pattern),
            ("pattern_type", old.pattern_type != new.pattern_type),
        ]);
        if let Some(field) = replaced {
            return Err(DbaasError::ForceNew(field));
        }

        let client = DbaasClient::for_scope(ctx, &self.scope(new)).await?;
        if old.allow_read != new.allow_read || old.allow_write != new.allow_write {
            let _lock = ctx.locks().lock(&new.datastore_id).await;
            let changes = json!({"allow_read": new.allow_read, "allow_write": new.allow_write});
            client
                .update(Kind::Acl, id, &changes)
                .await
                .map_err(|e| CloudError::updating("acl", id, e))?;
            wait_for_active::<Acl>(&client, Kind::Acl, id, timeouts.update, self.polling.active)
                .await
                .map_err(|e| CloudError::updating("acl", id, e))?;
        }

        fetch::<Acl>(&client, Kind::Acl, id)
            .await?
            .map(Into::into)
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, spec: &AclSpec, timeouts: &Timeouts) -> Result<()> {
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock(&spec.datastore_id).await;
        delete_and_wait(&client, Kind::Acl, id, timeouts.delete, self.polling.deletion).await
    }
}
