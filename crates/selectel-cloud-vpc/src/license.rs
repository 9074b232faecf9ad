//! `selectel_vpc_license_v2`

use crate::client::{License, LicenseOpts, ResellClient, Server};
use crate::error::{Result, VpcError};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use selectel_config::Region;
use serde::{Deserialize, Serialize};

const OBJECT: &str = "license";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LicenseSpec {
    pub project_id: String,
    pub region: Region,
    /// License kind, e.g. `license_windows_2016_standard`
    #[serde(rename = "type")]
    pub license_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LicenseState {
    pub id: String,
    pub project_id: String,
    pub region: String,
    #[serde(rename = "type")]
    pub license_type: String,
    pub status: String,
    pub servers: Vec<Server>,
}

impl Identified for LicenseState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<License> for LicenseState {
    fn from(license: License) -> Self {
        Self {
            id: license.id.to_string(),
            project_id: license.project_id,
            region: license.region,
            license_type: license.license_type,
            status: license.status,
            servers: license.servers,
        }
    }
}

pub struct LicenseHandler;

impl LicenseHandler {
    async fn fetch(&self, client: &ResellClient, id: &str) -> Result<Option<LicenseState>> {
        match client.get_license(id).await {
            Ok(license) => Ok(Some(license.into())),
            Err(VpcError::CloudError(err)) if err.is_not_found() => Ok(None),
            Err(err) => Err(CloudError::getting(OBJECT, id, err).into()),
        }
    }
}

#[async_trait]
impl ResourceHandler for LicenseHandler {
    type Spec = LicenseSpec;
    type State = LicenseState;
    type Error = VpcError;

    fn type_name(&self) -> &'static str {
        "selectel_vpc_license_v2"
    }

    fn scope(&self, spec: &LicenseSpec) -> Scope {
        Scope::new(spec.project_id.clone(), spec.region)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &LicenseSpec,
        _timeouts: &Timeouts,
    ) -> Result<LicenseState> {
        let client = ResellClient::from_context(ctx)?;
        let opts = LicenseOpts {
            region: spec.region.to_string(),
            quantity: 1,
            license_type: spec.license_type.clone(),
        };
        let license = client
            .create_license(&spec.project_id, opts)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        Ok(license.into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _scope: &Scope,
        _declared: Option<&LicenseSpec>,
    ) -> Result<Option<LicenseState>> {
        let client = ResellClient::from_context(ctx)?;
        self.fetch(&client, id).await
    }

    /// Every declared field forces a new license, so update only refreshes.
    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _old: &LicenseSpec,
        _new: &LicenseSpec,
        _timeouts: &Timeouts,
    ) -> Result<LicenseState> {
        let client = ResellClient::from_context(ctx)?;
        self.fetch(&client, id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _spec: &LicenseSpec,
        _timeouts: &Timeouts,
    ) -> Result<()> {
        let client = ResellClient::from_context(ctx)?;
        match client.delete_license(id).await {
            Ok(()) => Ok(()),
            Err(VpcError::CloudError(err)) if err.is_not_found() => Ok(()),
            Err(err) => Err(CloudError::deleting(OBJECT, id, err).into()),
        }
    }

    async fn import_scope(&self, _ctx: &ProviderContext) -> Result<Scope> {
        Ok(Scope::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use selectel_config::RawConfig;
    use serde_json::json;

    fn context(server: &MockServer) -> ProviderContext {
        let config = RawConfig {
            token: Some("sel-token".into()),
            endpoint: Some(server.base_url()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        ProviderContext::new(config)
    }

    #[test]
    fn test_spec_reads_type() {
        let spec: LicenseSpec = serde_json::from_value(json!({
            "project_id": "p-1", "region": "ru-3", "type": "license_windows_2016_standard"
        }))
        .unwrap();
        assert_eq!(spec.license_type, "license_windows_2016_standard");
        assert_eq!(spec.region, Region::Ru3);
    }

    #[tokio::test]
    async fn test_create_license() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/licenses/projects/p-1")
                .json_body(json!({"licenses": [{
                    "region": "ru-3", "quantity": 1, "type": "license_windows_2016_standard"
                }]}));
            then.status(200).json_body(json!({"licenses": [{
                "id": 4123, "project_id": "p-1", "region": "ru-3",
                "status": "DOWN", "type": "license_windows_2016_standard"
            }]}));
        });

        let spec = LicenseSpec {
            project_id: "p-1".into(),
            region: Region::Ru3,
            license_type: "license_windows_2016_standard".into(),
        };
        let state = LicenseHandler
            .create(&context(&server), &spec, &Timeouts::default())
            .await
            .unwrap();

        mock.assert();
        assert_eq!(state.id, "4123");
        assert_eq!(state.status, "DOWN");
    }

    #[tokio::test]
    async fn test_import_reads_by_id() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/licenses/4123");
            then.status(200).json_body(json!({"license": {
                "id": 4123, "project_id": "p-1", "region": "ru-3", "status": "ACTIVE",
                "type": "license_windows_2016_standard",
                "servers": [{"id": "srv-1", "name": "win", "status": "ACTIVE"}]
            }}));
        });

        let ctx = context(&server);
        let scope = LicenseHandler.import_scope(&ctx).await.unwrap();
        let state = LicenseHandler
            .read(&ctx, "4123", &scope, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.project_id, "p-1");
        assert_eq!(state.servers.len(), 1);

        let attributes = serde_json::to_value(&state).unwrap();
        assert_eq!(attributes["type"], "license_windows_2016_standard");
    }

    #[tokio::test]
    async fn test_delete_missing_license() {
        let server = MockServer::start();
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/licenses/4123");
            then.status(404);
        });

        let spec = LicenseSpec {
            project_id: "p-1".into(),
            region: Region::Ru3,
            license_type: "license_windows_2016_standard".into(),
        };
        LicenseHandler
            .delete(&context(&server), "4123", &spec, &Timeouts::default())
            .await
            .unwrap();
        delete.assert();
    }
}
