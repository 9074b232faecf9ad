//! `selectel_dbaas_postgresql_database_v1` and `selectel_dbaas_mysql_database_v1`

use crate::client::{Database, DatabaseCreateOpts, DbaasClient};
use crate::engine::{Family, validate_parent_datastore};
use crate::error::{DbaasError, Result};
use crate::status::{Kind, Polling, delete_and_wait, fetch, wait_for_active};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use selectel_config::Region;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const OBJECT: &str = "database";

/// Declared database
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatabaseSpec {
    pub project_id: String,
    pub region: Region,
    pub datastore_id: String,
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub lc_collate: Option<String>,
    #[serde(default)]
    pub lc_ctype: Option<String>,
}

/// `C` is the server default, so an unset locale matches it.
pub fn locale_unchanged(old: Option<&str>, new: Option<&str>) -> bool {
    old == new || (old == Some("C") && new.is_none())
}

impl DatabaseSpec {
    fn replaced_field(&self, new: &DatabaseSpec) -> Option<&'static str> {
        [
            ("project_id", self.project_id != new.project_id),
            ("region", self.region != new.region),
            ("datastore_id", self.datastore_id != new.datastore_id),
            ("name", self.name != new.name),
            (
                "lc_collate",
                !locale_unchanged(self.lc_collate.as_deref(), new.lc_collate.as_deref()),
            ),
            (
                "lc_ctype",
                !locale_unchanged(self.lc_ctype.as_deref(), new.lc_ctype.as_deref()),
            ),
        ]
        .into_iter()
        .find_map(|(field, changed)| changed.then_some(field))
    }

    fn lock_keys(&self) -> Vec<&str> {
        let mut keys = vec![self.datastore_id.as_str()];
        keys.extend(self.owner_id.as_deref());
        keys
    }
}

/// Observed database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseState {
    pub id: String,
    pub datastore_id: String,
    pub name: String,
    pub status: String,
    pub owner_id: Option<String>,
    pub lc_collate: Option<String>,
    pub lc_ctype: Option<String>,
}

impl Identified for DatabaseState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<Database> for DatabaseState {
    fn from(db: Database) -> Self {
        Self {
            id: db.id,
            datastore_id: db.datastore_id,
            name: db.name,
            status: db.status,
            owner_id: db.owner_id,
            lc_collate: db.lc_collate,
            lc_ctype: db.lc_ctype,
        }
    }
}

/// Handler for databases inside a PostgreSQL or MySQL datastore
pub struct DatabaseHandler {
    family: Family,
    polling: Polling,
}

impl DatabaseHandler {
    pub fn postgresql() -> Self {
        Self {
            family: Family::PostgreSql,
            polling: Kind::Database.polling(),
        }
    }

    pub fn mysql() -> Self {
        Self {
            family: Family::MySql,
            ..Self::postgresql()
        }
    }

    pub fn with_polling(mut self, polling: Polling) -> Self {
        self.polling = polling;
        self
    }

    fn validate(&self, spec: &DatabaseSpec) -> Result<()> {
        let postgres_only = spec.owner_id.is_some() || spec.lc_collate.is_some() || spec.lc_ctype.is_some();
        if self.family != Family::PostgreSql && postgres_only {
            return Err(DbaasError::Invalid(
                "owner_id, lc_collate and lc_ctype are only supported for PostgreSQL databases".into(),
            ));
        }
        Ok(())
    }

    async fn fetch_state(&self, client: &DbaasClient, id: &str) -> Result<Option<DatabaseState>> {
        Ok(fetch::<Database>(client, Kind::Database, id).await?.map(Into::into))
    }
}

#[async_trait]
impl ResourceHandler for DatabaseHandler {
    type Spec = DatabaseSpec;
    type State = DatabaseState;
    type Error = DbaasError;

    fn type_name(&self) -> &'static str {
        match self.family {
            Family::PostgreSql => "selectel_dbaas_postgresql_database_v1",
            _ => "selectel_dbaas_mysql_database_v1",
        }
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::uniform(Duration::from_secs(60 * 60))
    }

    fn scope(&self, spec: &DatabaseSpec) -> Scope {
        Scope::new(spec.project_id.clone(), spec.region)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &DatabaseSpec,
        timeouts: &Timeouts,
    ) -> Result<DatabaseState> {
        self.validate(spec)?;
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock_all(spec.lock_keys()).await;
        validate_parent_datastore(&client, self.family, &spec.datastore_id).await?;

        let opts = DatabaseCreateOpts {
            datastore_id: spec.datastore_id.clone(),
            name: spec.name.clone(),
            owner_id: spec.owner_id.clone(),
            lc_collate: spec.lc_collate.clone(),
            lc_ctype: spec.lc_ctype.clone(),
        };
        let database: Database = client
            .create(Kind::Database, &opts)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        let database: Database = wait_for_active(
            &client,
            Kind::Database,
            &database.id,
            timeouts.create,
            self.polling.active,
        )
        .await
        .map_err(|e| CloudError::creating(OBJECT, e))?;
        Ok(database.into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        scope: &Scope,
        _declared: Option<&DatabaseSpec>,
    ) -> Result<Option<DatabaseState>> {
        let client = DbaasClient::for_scope(ctx, scope).await?;
        self.fetch_state(&client, id).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &DatabaseSpec,
        new: &DatabaseSpec,
        timeouts: &Timeouts,
    ) -> Result<DatabaseState> {
        if let Some(field) = old.replaced_field(new) {
            return Err(DbaasError::ForceNew(field));
        }
        self.validate(new)?;
        let client = DbaasClient::for_scope(ctx, &self.scope(new)).await?;

        if old.owner_id != new.owner_id {
            let mut keys = new.lock_keys();
            keys.extend(old.owner_id.as_deref());
            let _lock = ctx.locks().lock_all(keys).await;

            let changes = json!({"owner_id": new.owner_id});
            client
                .update(Kind::Database, id, &changes)
                .await
                .map_err(|e| CloudError::updating(OBJECT, id, e))?;
            wait_for_active::<Database>(&client, Kind::Database, id, timeouts.update, self.polling.active)
                .await
                .map_err(|e| CloudError::updating(OBJECT, id, e))?;
        }

        self.fetch_state(&client, id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        spec: &DatabaseSpec,
        timeouts: &Timeouts,
    ) -> Result<()> {
        let client = DbaasClient::for_scope(ctx, &self.scope(spec)).await?;
        let _lock = ctx.locks().lock_all(spec.lock_keys()).await;
        delete_and_wait(&client, Kind::Database, id, timeouts.delete, self.polling.deletion).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;
    use httpmock::prelude::*;

    fn spec(owner_id: Option<&str>) -> DatabaseSpec {
        DatabaseSpec {
            project_id: "p-1".into(),
            region: Region::Ru3,
            datastore_id: "ds-1".into(),
            name: "app".into(),
            owner_id: owner_id.map(str::to_string),
            lc_collate: None,
            lc_ctype: None,
        }
    }

    fn database_json(status: &str, owner_id: &str) -> serde_json::Value {
        json!({"database": {
            "id": "db-1", "datastore_id": "ds-1", "name": "app",
            "status": status, "owner_id": owner_id, "lc_collate": "C", "lc_ctype": "C"
        }})
    }

    fn timeouts() -> Timeouts {
        Timeouts::uniform(Duration::from_secs(30))
    }

    fn parent_datastore(server: &MockServer, engine: &str) {
        server.mock(|when, then| {
            when.method(GET).path("/datastores/ds-1");
            then.status(200).json_body(json!({"datastore": {
                "id": "ds-1", "status": "ACTIVE", "type_id": "t-1"
            }}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/datastore-types/t-1");
            then.status(200)
                .json_body(json!({"datastore-type": {"id": "t-1", "engine": engine}}));
        });
    }

    #[test]
    fn test_locale_default_is_suppressed() {
        assert!(locale_unchanged(Some("C"), None));
        assert!(locale_unchanged(Some("ru_RU.utf8"), Some("ru_RU.utf8")));
        assert!(!locale_unchanged(None, Some("ru_RU.utf8")));

        let mut old = spec(None);
        old.lc_collate = Some("C".into());
        assert_eq!(old.replaced_field(&spec(None)), None);
        let mut new = spec(None);
        new.lc_ctype = Some("ru_RU.utf8".into());
        assert_eq!(old.replaced_field(&new), Some("lc_ctype"));
    }

    #[test]
    fn test_mysql_rejects_owner() {
        let err = DatabaseHandler::mysql().validate(&spec(Some("u-1"))).unwrap_err();
        assert!(err.to_string().contains("only supported for PostgreSQL"));
        assert!(DatabaseHandler::postgresql().validate(&spec(Some("u-1"))).is_ok());
    }

    #[tokio::test]
    async fn test_create_checks_parent_engine() {
        let server = MockServer::start();
        let ctx = context(&server);
        parent_datastore(&server, "redis");
        let create = server.mock(|when, then| {
            when.method(POST).path("/databases");
            then.status(200);
        });

        let err = DatabaseHandler::mysql()
            .with_polling(Polling::IMMEDIATE)
            .create(&ctx, &spec(None), &timeouts())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Provided datastore type must have one of the following engine types: mysql, mysql_native for this resource. But provided type is redis"
        );
        create.assert_hits(0);
    }

    #[tokio::test]
    async fn test_create_postgresql_database() {
        let server = MockServer::start();
        let ctx = context(&server);
        parent_datastore(&server, "postgresql");
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/databases")
                .json_body(json!({"database": {"datastore_id": "ds-1", "name": "app", "owner_id": "u-1"}}));
            then.status(200).json_body(database_json("PENDING_CREATE", "u-1"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/databases/db-1");
            then.status(200).json_body(database_json("ACTIVE", "u-1"));
        });

        let state = DatabaseHandler::postgresql()
            .with_polling(Polling::IMMEDIATE)
            .create(&ctx, &spec(Some("u-1")), &timeouts())
            .await
            .unwrap();

        create.assert();
        assert_eq!(state.status, "ACTIVE");
        assert_eq!(state.lc_collate.as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn test_update_owner() {
        let server = MockServer::start();
        let ctx = context(&server);
        let update = server.mock(|when, then| {
            when.method(PUT)
                .path("/databases/db-1")
                .json_body(json!({"database": {"owner_id": "u-2"}}));
            then.status(200);
        });
        server.mock(|when, then| {
            when.method(GET).path("/databases/db-1");
            then.status(200).json_body(database_json("ACTIVE", "u-2"));
        });

        let state = DatabaseHandler::postgresql()
            .with_polling(Polling::IMMEDIATE)
            .update(&ctx, "db-1", &spec(Some("u-1")), &spec(Some("u-2")), &timeouts())
            .await
            .unwrap();

        update.assert();
        assert_eq!(state.owner_id.as_deref(), Some("u-2"));
    }
}
