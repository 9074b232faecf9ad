//! `selectel_vpc_floatingip_v2`

use crate::client::{FloatingIp, FloatingIpOpts, ResellClient, Server};
use crate::error::{Result, VpcError};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use selectel_config::Region;
use serde::{Deserialize, Serialize};

const OBJECT: &str = "floating IP";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FloatingIpSpec {
    pub project_id: String,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloatingIpState {
    pub id: String,
    pub project_id: String,
    pub region: String,
    pub floating_ip_address: String,
    pub fixed_ip_address: String,
    pub port_id: String,
    pub status: String,
    pub servers: Vec<Server>,
}

impl Identified for FloatingIpState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<FloatingIp> for FloatingIpState {
    fn from(ip: FloatingIp) -> Self {
        Self {
            id: ip.id,
            project_id: ip.project_id,
            region: ip.region,
            floating_ip_address: ip.floating_ip_address,
            fixed_ip_address: ip.fixed_ip_address,
            port_id: ip.port_id,
            status: ip.status,
            servers: ip.servers,
        }
    }
}

pub struct FloatingIpHandler;

impl FloatingIpHandler {
    async fn fetch(&self, client: &ResellClient, id: &str) -> Result<Option<FloatingIpState>> {
        match client.get_floating_ip(id).await {
            Ok(ip) => Ok(Some(ip.into())),
            Err(VpcError::CloudError(err)) if err.is_not_found() => Ok(None),
            Err(err) => Err(CloudError::getting(OBJECT, id, err).into()),
        }
    }
}

#[async_trait]
impl ResourceHandler for FloatingIpHandler {
    type Spec = FloatingIpSpec;
    type State = FloatingIpState;
    type Error = VpcError;

    fn type_name(&self) -> &'static str {
        "selectel_vpc_floatingip_v2"
    }

    fn scope(&self, spec: &FloatingIpSpec) -> Scope {
        Scope::new(spec.project_id.clone(), spec.region)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &FloatingIpSpec,
        _timeouts: &Timeouts,
    ) -> Result<FloatingIpState> {
        let client = ResellClient::from_context(ctx)?;
        let opts = FloatingIpOpts {
            region: spec.region.to_string(),
            quantity: 1,
        };
        let ip = client
            .create_floating_ip(&spec.project_id, opts)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        Ok(ip.into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _scope: &Scope,
        _declared: Option<&FloatingIpSpec>,
    ) -> Result<Option<FloatingIpState>> {
        let client = ResellClient::from_context(ctx)?;
        self.fetch(&client, id).await
    }

    /// Project and region both force a new floating IP.
    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _old: &FloatingIpSpec,
        _new: &FloatingIpSpec,
        _timeouts: &Timeouts,
    ) -> Result<FloatingIpState> {
        let client = ResellClient::from_context(ctx)?;
        self.fetch(&client, id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _spec: &FloatingIpSpec,
        _timeouts: &Timeouts,
    ) -> Result<()> {
        let client = ResellClient::from_context(ctx)?;
        match client.delete_floating_ip(id).await {
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

    fn spec() -> FloatingIpSpec {
        FloatingIpSpec {
            project_id: "p-1".into(),
            region: Region::Ru2,
        }
    }

    #[tokio::test]
    async fn test_create_floating_ip() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/floatingips/projects/p-1")
                .header("X-Token", "sel-token")
                .json_body(json!({"floatingips": [{"region": "ru-2", "quantity": 1}]}));
            then.status(200).json_body(json!({"floatingips": [{
                "id": "fip-1", "floating_ip_address": "203.0.113.10",
                "project_id": "p-1", "region": "ru-2", "status": "DOWN"
            }]}));
        });

        let state = FloatingIpHandler
            .create(&context(&server), &spec(), &Timeouts::default())
            .await
            .unwrap();

        mock.assert();
        assert_eq!(state.id, "fip-1");
        assert_eq!(state.status, "DOWN");
        assert_eq!(state.floating_ip_address, "203.0.113.10");
        assert!(state.servers.is_empty());
    }

    #[tokio::test]
    async fn test_read_with_server() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/floatingips/fip-1");
            then.status(200).json_body(json!({"floatingip": {
                "id": "fip-1", "floating_ip_address": "203.0.113.10",
                "fixed_ip_address": "10.0.0.5", "port_id": "port-1",
                "project_id": "p-1", "region": "ru-2", "status": "ACTIVE",
                "servers": [{"id": "srv-1", "name": "web", "status": "ACTIVE"}]
            }}));
        });

        let state = FloatingIpHandler
            .read(&context(&server), "fip-1", &Scope::default(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.fixed_ip_address, "10.0.0.5");
        assert_eq!(state.servers[0].name, "web");
    }

    #[tokio::test]
    async fn test_read_missing_and_delete_missing() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/floatingips/fip-1");
            then.status(404);
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/floatingips/fip-1");
            then.status(404);
        });

        let ctx = context(&server);
        let state = FloatingIpHandler
            .read(&ctx, "fip-1", &Scope::default(), None)
            .await
            .unwrap();
        assert!(state.is_none());

        FloatingIpHandler
            .delete(&ctx, "fip-1", &spec(), &Timeouts::default())
            .await
            .unwrap();
        delete.assert();
    }

    #[tokio::test]
    async fn test_delete_error_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/floatingips/fip-1");
            then.status(409).json_body(json!({"error": "floating IP is in use"}));
        });

        let err = FloatingIpHandler
            .delete(&context(&server), "fip-1", &spec(), &Timeouts::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("error deleting floating IP fip-1"));
        let err: CloudError = err.into();
        assert_eq!(err.status_code(), Some(409));
    }
}
