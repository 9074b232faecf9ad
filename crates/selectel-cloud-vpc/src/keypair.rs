//! `selectel_vpc_keypair_v2`
//!
//! Keypairs have no id of their own; they are addressed by the owning user
//! and their name, so the resource id is `<user_id>/<name>`. The API keeps
//! one copy per region, and a read merges the regions of every copy.

use crate::client::{Keypair, KeypairOpts, ResellClient};
use crate::error::{Result, VpcError};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use selectel_config::Region;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const OBJECT: &str = "keypair";

pub fn keypair_id(user_id: &str, name: &str) -> String {
    format!("{user_id}/{name}")
}

/// Split a `<user_id>/<name>` identifier.
pub fn parse_keypair_id(id: &str) -> Result<(String, String)> {
    match id.split('/').collect::<Vec<_>>().as_slice() {
        [user_id, name] if !user_id.is_empty() && !name.is_empty() => {
            Ok((user_id.to_string(), name.to_string()))
        }
        _ => Err(VpcError::InvalidKeypairId(id.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeypairSpec {
    pub name: String,
    pub public_key: String,
    pub user_id: String,
    /// Every region when empty
    #[serde(default)]
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeypairState {
    pub id: String,
    pub name: String,
    pub public_key: String,
    pub user_id: String,
    pub regions: Vec<String>,
}

impl Identified for KeypairState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl KeypairState {
    /// Merge the copies of one keypair; `None` when there are none.
    fn merge<'a>(copies: impl IntoIterator<Item = &'a Keypair>) -> Option<Self> {
        let mut copies = copies.into_iter().peekable();
        let first = copies.peek().copied()?;
        let mut state = Self {
            id: keypair_id(&first.user_id, &first.name),
            name: first.name.clone(),
            public_key: first.public_key.clone(),
            user_id: first.user_id.clone(),
            regions: Vec::new(),
        };
        let regions: BTreeSet<String> = copies.flat_map(|k| k.regions.iter().cloned()).collect();
        state.regions = regions.into_iter().collect();
        Some(state)
    }
}

pub struct KeypairHandler;

impl KeypairHandler {
    async fn fetch(&self, client: &ResellClient, id: &str) -> Result<Option<KeypairState>> {
        let (user_id, name) = parse_keypair_id(id)?;
        let keypairs = client
            .list_keypairs()
            .await
            .map_err(|e| CloudError::getting(OBJECT, id, e))?;
        Ok(KeypairState::merge(
            keypairs
                .iter()
                .filter(|k| k.user_id == user_id && k.name == name),
        ))
    }
}

#[async_trait]
impl ResourceHandler for KeypairHandler {
    type Spec = KeypairSpec;
    type State = KeypairState;
    type Error = VpcError;

    fn type_name(&self) -> &'static str {
        "selectel_vpc_keypair_v2"
    }

    fn scope(&self, _spec: &KeypairSpec) -> Scope {
        Scope::default()
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &KeypairSpec,
        _timeouts: &Timeouts,
    ) -> Result<KeypairState> {
        let client = ResellClient::from_context(ctx)?;
        let opts = KeypairOpts {
            name: spec.name.clone(),
            public_key: spec.public_key.clone(),
            user_id: spec.user_id.clone(),
            regions: spec.regions.iter().map(Region::to_string).collect(),
        };
        let created = client
            .create_keypair(&opts)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        KeypairState::merge(&created).ok_or(VpcError::EmptyCreateResponse(OBJECT))
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _scope: &Scope,
        _declared: Option<&KeypairSpec>,
    ) -> Result<Option<KeypairState>> {
        let client = ResellClient::from_context(ctx)?;
        self.fetch(&client, id).await
    }

    /// Every declared field forces a new keypair, so update only refreshes.
    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _old: &KeypairSpec,
        _new: &KeypairSpec,
        _timeouts: &Timeouts,
    ) -> Result<KeypairState> {
        let client = ResellClient::from_context(ctx)?;
        self.fetch(&client, id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _spec: &KeypairSpec,
        _timeouts: &Timeouts,
    ) -> Result<()> {
        let (user_id, name) = parse_keypair_id(id)?;
        let client = ResellClient::from_context(ctx)?;
        match client.delete_keypair(&name, &user_id).await {
            Ok(()) => Ok(()),
            Err(VpcError::CloudError(err)) if err.is_not_found() => Ok(()),
            Err(err) => Err(CloudError::deleting(OBJECT, id, err).into()),
        }
    }

    async fn import_scope(&self, _ctx: &ProviderContext) -> Result<Scope> {
        Ok(Scope::default())
    }
}
