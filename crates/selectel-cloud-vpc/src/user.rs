//! `selectel_vpc_user_v2`

use crate::client::{ResellClient, User, UserOpts};
use crate::error::{Result, VpcError};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use serde::{Deserialize, Serialize};

const OBJECT: &str = "user";

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserSpec {
    pub name: String,
    pub password: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserState {
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

impl Identified for UserState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<User> for UserState {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            enabled: user.enabled,
        }
    }
}

pub struct UserHandler;

impl UserHandler {
    async fn fetch(&self, client: &ResellClient, id: &str) -> Result<Option<UserState>> {
        match client.get_user(id).await {
            Ok(user) => Ok(Some(user.into())),
            Err(VpcError::CloudError(err)) if err.is_not_found() => Ok(None),
            Err(err) => Err(CloudError::getting(OBJECT, id, err).into()),
        }
    }
}

#[async_trait]
impl ResourceHandler for UserHandler {
    type Spec = UserSpec;
    type State = UserState;
    type Error = VpcError;

    fn type_name(&self) -> &'static str {
        "selectel_vpc_user_v2"
    }

    fn scope(&self, _spec: &UserSpec) -> Scope {
        Scope::default()
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &UserSpec,
        _timeouts: &Timeouts,
    ) -> Result<UserState> {
        let client = ResellClient::from_context(ctx)?;
        let opts = UserOpts {
            name: spec.name.clone(),
            password: spec.password.clone(),
            enabled: None,
        };
        let user = client
            .create_user(&opts)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;

        if !spec.enabled {
            let opts = UserOpts {
                enabled: Some(false),
                ..opts
            };
            client
                .update_user(&user.id, &opts)
                .await
                .map_err(|e| CloudError::updating(OBJECT, &user.id, e))?;
        }

        self.fetch(&client, &user.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(user.id.clone()).into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _scope: &Scope,
        _declared: Option<&UserSpec>,
    ) -> Result<Option<UserState>> {
        let client = ResellClient::from_context(ctx)?;
        self.fetch(&client, id).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _old: &UserSpec,
        new: &UserSpec,
        _timeouts: &Timeouts,
    ) -> Result<UserState> {
        let client = ResellClient::from_context(ctx)?;
        let opts = UserOpts {
            name: new.name.clone(),
            password: new.password.clone(),
            enabled: Some(new.enabled),
        };
        client
            .update_user(id, &opts)
            .await
            .map_err(|e| CloudError::updating(OBJECT, id, e))?;

        self.fetch(&client, id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _spec: &UserSpec,
        _timeouts: &Timeouts,
    ) -> Result<()> {
        let client = ResellClient::from_context(ctx)?;
        match client.delete_user(id).await {
            Ok(()) => Ok(()),
            Err(VpcError::CloudError(err)) if err.is_not_found() => Ok(()),
            Err(err) => Err(CloudError::deleting(OBJECT, id, err).into()),
        }
    }

    async fn import_scope(&self, _ctx: &ProviderContext) -> Result<Scope> {
        Ok(Scope::default())
    }
}
