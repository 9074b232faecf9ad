//! `selectel_dbaas_postgresql_logical_replication_slot_v1`
//!
//! Slots have no mutable attributes; any change recreates the slot.

use crate::client::{DbaasClient, LogicalReplicationSlot, SlotCreateOpts};
use crate::engine::{Family, validate_parent_datastore};
use crate::error::{DbaasError, Result};
use crate::status::{Kind, Polling, delete_and_wait, fetch, wait_for_active};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use selectel_config::Region;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OBJECT: &str = "logical replication slot";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlotSpec {
    pub project_id: String,
    pub region: Region,
    pub datastore_id: String,
    pub database_id: String,
    pub name: String,
}

impl SlotSpec {
    fn replaced_field(&self, new: &SlotSpec) -> Option<&'static str> {
        [
            ("project_id", self.project_id != new.project_id),
            ("region", self.region != new.region),
            ("datastore_id", self.datastore_id != new.datastore_id),
            ("database_id", self.database_id != new.database_id),
            ("name", self.name != new.name),
        ]
        .into_iter()
        .find_map(|(field, changed)| changed.then_some(field))
    }

    fn lock_keys(&self) -> [&str; 2] {
        [self.datastore_id.as_str(), self.database_id.as_str()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotState {
    pub id: String,
    pub datastore_id: String,
    pub database_id: String,
    pub name: String,
    pub status: String,
}

impl Identified for SlotState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<LogicalReplicationSlot> for SlotState {
    fn from(slot: LogicalReplicationSlot) -> Self {
        Self {
            id: slot.id,
            datastore_id: slot.datastore_id,
            database_id: slot.database_id,
            name: slot.name,
            status: slot.status,
        }
    }
}

pub struct SlotHandler {
    polling: Polling,
}

impl Default for SlotHandler {
    fn default() -> Self {
        Self {
            polling: Kind::Slot.polling(),
        }
    }
}

impl SlotHandler {
    pub fn with_polling(polling: Polling) -> Self {
        Self { polling }
    }
}

#[async_trait]
impl ResourceHandler for SlotHandler {
    type Spec = SlotSpec;
    type State = SlotState;
    type Error = DbaasError;

    fn type_name(&self) -> &'static str {
        "selectel_dbaas_postgresql_logical_replication_slot_v1"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::uniform(Duration::from_secs(60 * 60))
    }

    fn scope(&self, spec: &SlotSpec) -> Scope {
        Scope::new(spec.project_id.clone(), spec.region)
    }

    async fn create(&self, ctx: &ProviderContext, spec: &SlotSpec, timeouts: &Timeouts) -> Result<SlotState> {
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock_all(spec.lock_keys()).await;
        validate_parent_datastore(&client, Family::PostgreSql, &spec.datastore_id).await?;

        let opts = SlotCreateOpts {
            datastore_id: spec.datastore_id.clone(),
            database_id: spec.database_id.clone(),
            name: spec.name.clone(),
        };
        let slot: LogicalReplicationSlot = client
            .create(Kind::Slot, &opts)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        tracing::debug!(id = %slot.id, "Waiting for logical replication slot");
        let slot: LogicalReplicationSlot =
            wait_for_active(&client, Kind::Slot, &slot.id, timeouts.create, self.polling.active)
                .await
                .map_err(|e| CloudError::creating(OBJECT, e))?;
        Ok(slot.into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        scope: &Scope,
        _declared: Option<&SlotSpec>,
    ) -> Result<Option<SlotState>> {
        let client = DbaasClient::for_scope(ctx, scope).await?;
        Ok(fetch::<LogicalReplicationSlot>(&client, Kind::Slot, id)
            .await?
            .map(Into::into))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &SlotSpec,
        new: &SlotSpec,
        _timeouts: &Timeouts,
    ) -> Result<SlotState> {
        if let Some(field) = old.replaced_field(new) {
            return Err(DbaasError::ForceNew(field));
        }
        self.read(ctx, id, &self.scope(new), Some(new))
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, spec: &SlotSpec, timeouts: &Timeouts) -> Result<()> {
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock_all(spec.lock_keys()).await;
        delete_and_wait(&client, Kind::Slot, id, timeouts.delete, self.polling.deletion).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;
    use httpmock::prelude::*;
    use serde_json::json;

    fn spec() -> SlotSpec {
        SlotSpec {
            project_id: "p-1".into(),
            region: Region::Ru3,
            datastore_id: "ds-1".into(),
            database_id: "db-1".into(),
            name: "cdc".into(),
        }
    }

    fn slot_json(status: &str) -> serde_json::Value {
        json!({"logical-replication-slot": {
            "id": "s-1", "datastore_id": "ds-1", "database_id": "db-1",
            "name": "cdc", "status": status
        }})
    }

    fn timeouts() -> Timeouts {
        Timeouts::uniform(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_create_slot() {
        let server = MockServer::start();
        let ctx = context(&server);
        server.mock(|when, then| {
            when.method(GET).path("/datastores/ds-1");
            then.status(200)
                .json_body(json!({"datastore": {"id": "ds-1", "status": "ACTIVE", "type_id": "t-pg"}}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/datastore-types/t-pg");
            then.status(200)
                .json_body(json!({"datastore-type": {"id": "t-pg", "engine": "postgresql"}}));
        });
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/logical-replication-slots")
                .json_body(json!({"logical-replication-slot": {
                    "datastore_id": "ds-1", "database_id": "db-1", "name": "cdc"
                }}));
            then.status(200).json_body(slot_json("PENDING_CREATE"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/logical-replication-slots/s-1");
            then.status(200).json_body(slot_json("ACTIVE"));
        });

        let state = SlotHandler::with_polling(Polling::IMMEDIATE)
            .create(&ctx, &spec(), &timeouts())
            .await
            .unwrap();

        create.assert();
        assert_eq!(state.status, "ACTIVE");
        assert_eq!(state.database_id, "db-1");
    }

    #[tokio::test]
    async fn test_any_change_is_force_new() {
        let server = MockServer::start();
        let mut moved = spec();
        moved.database_id = "db-2".into();

        let err = SlotHandler::default()
            .update(&context(&server), "s-1", &spec(), &moved, &timeouts())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "database_id cannot be changed without recreating the resource"
        );
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_slot() {
        let server = MockServer::start();
        let ctx = context(&server);
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/logical-replication-slots/s-1");
            then.status(404);
        });

        SlotHandler::with_polling(Polling::IMMEDIATE)
            .delete(&ctx, "s-1", &spec(), &timeouts())
            .await
            .unwrap();
        delete.assert();
    }
}
