//! Resource handler contract
//!
//! A [`ResourceHandler`] maps one resource type onto one service API with
//! strongly typed declared specs. [`DynResource`] erases the types so the
//! provider registry can hold every handler behind one object-safe trait and
//! decode JSON attributes once, at the boundary.

use crate::context::{ProviderContext, Scope};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-operation timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(with = "secs")]
    pub create: Duration,
    #[serde(with = "secs")]
    pub update: Duration,
    #[serde(with = "secs")]
    pub delete: Duration,
}

impl Timeouts {
    pub const fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            update: timeout,
            delete: timeout,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(20 * 60))
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Observed state of a managed resource, as handed back to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-specific resource ID
    pub id: String,

    /// Resource type name
    pub resource_type: String,

    /// Last status reported by the API, if the resource has one
    pub status: Option<String>,

    /// Observed attributes
    pub attributes: serde_json::Value,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: None,
            attributes: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_attributes(mut self, attributes: serde_json::Value) -> Self {
        self.status = attributes
            .get("status")
            .and_then(|s| s.as_str())
            .map(str::to_string);
        self.attributes = attributes;
        self
    }
}

/// Observed state types expose the id the host stores
pub trait Identified {
    fn id(&self) -> String;
}

/// Typed create/read/update/delete/import for one resource type
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    type Spec: DeserializeOwned + Send + Sync;
    type State: Serialize + Identified + Send + Sync;
    type Error: From<CloudError> + Into<CloudError> + Send;

    /// Resource type name, e.g. `selectel_mks_cluster_v1`
    fn type_name(&self) -> &'static str;

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Where a resource declared by `spec` lives
    fn scope(&self, spec: &Self::Spec) -> Scope;

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &Self::Spec,
        timeouts: &Timeouts,
    ) -> std::result::Result<Self::State, Self::Error>;

    /// `Ok(None)` means the resource is gone and should be dropped.
    ///
    /// `declared` is the last known declaration; it is `None` on import.
    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        scope: &Scope,
        declared: Option<&Self::Spec>,
    ) -> std::result::Result<Option<Self::State>, Self::Error>;

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &Self::Spec,
        new: &Self::Spec,
        timeouts: &Timeouts,
    ) -> std::result::Result<Self::State, Self::Error>;

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        spec: &Self::Spec,
        timeouts: &Timeouts,
    ) -> std::result::Result<(), Self::Error>;

    /// Scope used to read a resource that is imported by id.
    async fn import_scope(
        &self,
        ctx: &ProviderContext,
    ) -> std::result::Result<Scope, Self::Error> {
        Ok(ctx.import_scope()?)
    }
}

/// Object-safe, JSON-facing view of a [`ResourceHandler`]
#[async_trait]
pub trait DynResource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn default_timeouts(&self) -> Timeouts;

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &serde_json::Value,
        timeouts: Option<Timeouts>,
    ) -> Result<ResourceState>;

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        spec: &serde_json::Value,
    ) -> Result<Option<ResourceState>>;

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &serde_json::Value,
        new: &serde_json::Value,
        timeouts: Option<Timeouts>,
    ) -> Result<ResourceState>;

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        spec: &serde_json::Value,
        timeouts: Option<Timeouts>,
    ) -> Result<()>;

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Option<ResourceState>>;
}

/// Box a typed handler for the registry
pub fn erase<H>(handler: H) -> Box<dyn DynResource>
where
    H: ResourceHandler + 'static,
{
    Box::new(Erased(handler))
}

struct Erased<H>(H);

impl<H: ResourceHandler> Erased<H> {
    fn decode(&self, spec: &serde_json::Value) -> Result<H::Spec> {
        serde_json::from_value(spec.clone()).map_err(|e| {
            CloudError::Validation(format!(
                "invalid {} attributes: {}",
                self.0.type_name(),
                e
            ))
        })
    }

    fn encode(&self, state: &H::State) -> Result<ResourceState> {
        Ok(ResourceState::new(state.id(), self.0.type_name())
            .with_attributes(serde_json::to_value(state)?))
    }
}

#[async_trait]
impl<H: ResourceHandler> DynResource for Erased<H> {
    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn default_timeouts(&self) -> Timeouts {
        self.0.default_timeouts()
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &serde_json::Value,
        timeouts: Option<Timeouts>,
    ) -> Result<ResourceState> {
        let spec = self.decode(spec)?;
        let timeouts = timeouts.unwrap_or_else(|| self.0.default_timeouts());
        let state = self
            .0
            .create(ctx, &spec, &timeouts)
            .await
            .map_err(Into::into)?;
        self.encode(&state)
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        spec: &serde_json::Value,
    ) -> Result<Option<ResourceState>> {
        let spec = self.decode(spec)?;
        let scope = self.0.scope(&spec);
        match self
            .0
            .read(ctx, id, &scope, Some(&spec))
            .await
            .map_err(Into::into)?
        {
            Some(state) => Ok(Some(self.encode(&state)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &serde_json::Value,
        new: &serde_json::Value,
        timeouts: Option<Timeouts>,
    ) -> Result<ResourceState> {
        let old = self.decode(old)?;
        let new = self.decode(new)?;
        let timeouts = timeouts.unwrap_or_else(|| self.0.default_timeouts());
        let state = self
            .0
            .update(ctx, id, &old, &new, &timeouts)
            .await
            .map_err(Into::into)?;
        self.encode(&state)
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        spec: &serde_json::Value,
        timeouts: Option<Timeouts>,
    ) -> Result<()> {
        let spec = self.decode(spec)?;
        let timeouts = timeouts.unwrap_or_else(|| self.0.default_timeouts());
        self.0
            .delete(ctx, id, &spec, &timeouts)
            .await
            .map_err(Into::into)
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Option<ResourceState>> {
        let scope = self.0.import_scope(ctx).await.map_err(Into::into)?;
        tracing::info!(resource_type = self.0.type_name(), id, "Importing resource");
        match self.0.read(ctx, id, &scope, None).await.map_err(Into::into)? {
            Some(state) => Ok(Some(self.encode(&state)?)),
            None => Ok(None),
        }
    }
}
