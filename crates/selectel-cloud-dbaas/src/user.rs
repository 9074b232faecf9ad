//! `selectel_dbaas_user_v1`

use crate::client::{DbaasClient, User, UserCreateOpts};
use crate::error::{DbaasError, Result};
use crate::status::{Kind, Polling, delete_and_wait, fetch, wait_for_active};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use selectel_config::Region;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const OBJECT: &str = "user";

/// Declared datastore user
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DbUserSpec {
    pub project_id: String,
    pub region: Region,
    pub datastore_id: String,
    pub name: String,
    pub password: String,
}

/// Observed datastore user; the password is never read back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbUserState {
    pub id: String,
    pub datastore_id: String,
    pub name: String,
    pub status: String,
}

impl Identified for DbUserState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<User> for DbUserState {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            datastore_id: user.datastore_id,
            name: user.name,
            status: user.status,
        }
    }
}

pub struct DbUserHandler {
    polling: Polling,
}

impl Default for DbUserHandler {
    fn default() -> Self {
        Self {
            polling: Kind::User.polling(),
        }
    }
}

impl DbUserHandler {
    pub fn with_polling(polling: Polling) -> Self {
        Self { polling }
    }
}

#[async_trait]
impl ResourceHandler for DbUserHandler {
    type Spec = DbUserSpec;
    type State = DbUserState;
    type Error = DbaasError;

    fn type_name(&self) -> &'static str {
        "selectel_dbaas_user_v1"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::uniform(Duration::from_secs(60 * 60))
    }

    fn scope(&self, spec: &DbUserSpec) -> Scope {
        Scope::new(spec.project_id.clone(), spec.region)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &DbUserSpec,
        timeouts: &Timeouts,
    ) -> Result<DbUserState> {
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock(&spec.datastore_id).await;

        let opts = UserCreateOpts {
            datastore_id: spec.datastore_id.clone(),
            name: spec.name.clone(),
            password: spec.password.clone(),
        };
        let user: User = client
            .create(Kind::User, &opts)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        let user: User = wait_for_active(&client, Kind::User, &user.id, timeouts.create, self.polling.active)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        Ok(user.into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        scope: &Scope,
        _declared: Option<&DbUserSpec>,
    ) -> Result<Option<DbUserState>> {
        let client = DbaasClient::for_scope(ctx, scope).await?;
        Ok(fetch::<User>(&client, Kind::User, id).await?.map(Into::into))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &DbUserSpec,
        new: &DbUserSpec,
        timeouts: &Timeouts,
    ) -> Result<DbUserState> {
        let replaced = [
            ("project_id", old.project_id != new.project_id),
            ("region", old.region != new.region),
            ("datastore_id", old.datastore_id != new.datastore_id),
            ("name", old.name != new.name),
        ]
        .into_iter()
        .find_map(|(field, changed)| changed.then_some(field));
        if let Some(field) = replaced {
            return Err(DbaasError::ForceNew(field));
        }

        let client = DbaasClient::for_scope(ctx, &self.scope(new)).await?;
        if old.password != new.password {
            let _lock = ctx.locks().lock(&new.datastore_id).await;
            client
                .update(Kind::User, id, &json!({"password": new.password}))
                .await
                .map_err(|e| CloudError::updating(OBJECT, id, e))?;
            wait_for_active::<User>(&client, Kind::User, id, timeouts.update, self.polling.active)
                .await
                .map_err(|e| CloudError::updating(OBJECT, id, e))?;
        }

        fetch::<User>(&client, Kind::User, id)
            .await?
            .map(Into::into)
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        spec: &DbUserSpec,
        timeouts: &Timeouts,
    ) -> Result<()> {
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock(&spec.datastore_id).await;
        delete_and_wait(&client, Kind::User, id, timeouts.delete, self.polling.deletion).await
    }
}
