//! Resell v2 API client
//!
//! Projects, project quotas, users, subnets, floating IPs, licenses, keypairs
//! and project-scoped tokens.
//! Authenticated with the account's Selectel token in `X-Token`.

use crate::error::{Result, VpcError};
use crate::quota::{Quota, QuotaMap, ResourceQuotaOpts, quotas_from_map};
use selectel_cloud::{HEADER_X_TOKEN, ProviderContext, ServiceClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Project as returned by the API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub custom_url: String,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub quotas: QuotaMap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectCreateOpts {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub quotas: BTreeMap<String, Vec<ResourceQuotaOpts>>,
    pub auto_quotas: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

impl ProjectUpdateOpts {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// User as returned by the API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserOpts {
    pub name: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Subnet as returned by the API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subnet {
    pub id: u64,
    pub cidr: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub servers: Vec<Server>,
}

/// Server attached to a subnet, floating IP or license
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubnetOpts {
    pub region: String,
    pub quantity: u32,
    #[serde(rename = "type")]
    pub ip_version: String,
    pub prefix_length: u32,
}

/// Floating IP as returned by the API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    #[serde(default)]
    pub floating_ip_address: String,
    #[serde(default)]
    pub fixed_ip_address: String,
    #[serde(default)]
    pub port_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FloatingIpOpts {
    pub region: String,
    pub quantity: u32,
}

/// License as returned by the API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct License {
    pub id: u64,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type", default)]
    pub license_type: String,
    #[serde(default)]
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LicenseOpts {
    pub region: String,
    pub quantity: u32,
    #[serde(rename = "type")]
    pub license_type: String,
}

/// Keypair as returned by the API; one entry per region it was uploaded to
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Keypair {
    pub name: String,
    pub user_id: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeypairOpts {
    pub name: String,
    pub public_key: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct ProjectEnvelope<T> {
    project: T,
}

#[derive(Serialize, Deserialize)]
struct UserEnvelope<T> {
    user: T,
}

#[derive(Serialize, Deserialize)]
struct QuotasEnvelope<T> {
    quotas: T,
}

#[derive(Serialize)]
struct SubnetsRequest<'a> {
    subnets: &'a [SubnetOpts],
}

#[derive(Deserialize)]
struct SubnetsResponse {
    subnets: Vec<Subnet>,
}

#[derive(Deserialize)]
struct SubnetResponse {
    subnet: Subnet,
}

#[derive(Serialize)]
struct FloatingIpsRequest<'a> {
    floatingips: &'a [FloatingIpOpts],
}

#[derive(Deserialize)]
struct FloatingIpsResponse {
    floatingips: Vec<FloatingIp>,
}

#[derive(Deserialize)]
struct FloatingIpResponse {
    floatingip: FloatingIp,
}

#[derive(Serialize)]
struct LicensesRequest<'a> {
    licenses: &'a [LicenseOpts],
}

#[derive(Deserialize)]
struct LicensesResponse {
    licenses: Vec<License>,
}

#[derive(Deserialize)]
struct LicenseResponse {
    license: License,
}

#[derive(Serialize)]
struct KeypairRequest<'a> {
    keypair: &'a KeypairOpts,
}

#[derive(Deserialize)]
struct KeypairCreateResponse {
    keypair: Vec<Keypair>,
}

#[derive(Deserialize)]
struct KeypairsResponse {
    keypairs: Vec<Keypair>,
}

/// Bulk create endpoints answer with a list; one item was asked for.
fn first_created<T>(items: Vec<T>, object: &'static str) -> Result<T> {
    items
        .into_iter()
        .next()
        .ok_or(VpcError::EmptyCreateResponse(object))
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    token: TokenOpts<'a>,
}

#[derive(Serialize)]
struct TokenOpts<'a> {
    project_id: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Token,
}

#[derive(Deserialize)]
struct Token {
    id: String,
}

/// Resell v2 client
#[derive(Debug, Clone)]
pub struct ResellClient {
    client: ServiceClient,
}

impl ResellClient {
    pub fn new(http: reqwest::Client, endpoint: &str, token: &str) -> Self {
        Self {
            client: ServiceClient::new(http, endpoint, HEADER_X_TOKEN, token),
        }
    }

    /// Client for the configured resell endpoint; requires a Selectel token.
    pub fn from_context(ctx: &ProviderContext) -> Result<Self> {
        let config = ctx.config();
        let token = config.token.as_deref().ok_or(VpcError::TokenRequired)?;
        Ok(Self::new(ctx.http().clone(), &config.endpoint, token))
    }

    pub async fn create_project(&self, opts: &ProjectCreateOpts) -> Result<Project> {
        tracing::info!(name = %opts.name, "Creating project");
        let response: ProjectEnvelope<Project> = self
            .client
            .post("projects", &ProjectEnvelope { project: opts })
            .await?;
        Ok(response.project)
    }

    pub async fn get_project(&self, id: &str) -> Result<Project> {
        tracing::debug!(id, "Getting project");
        let response: ProjectEnvelope<Project> =
            self.client.get(&format!("projects/{id}")).await?;
        Ok(response.project)
    }

    pub async fn update_project(&self, id: &str, opts: &ProjectUpdateOpts) -> Result<()> {
        tracing::info!(id, ?opts, "Updating project");
        self.client
            .patch_unit(&format!("projects/{id}"), &ProjectEnvelope { project: opts })
            .await?;
        Ok(())
    }

    pub async fn delete_project(&self, id: &str) -> Result<()> {
        tracing::info!(id, "Deleting project");
        self.client.delete(&format!("projects/{id}")).await?;
        Ok(())
    }

    pub async fn project_quotas(&self, project_id: &str) -> Result<Vec<Quota>> {
        tracing::debug!(project_id, "Getting project quotas");
        let response: QuotasEnvelope<QuotaMap> = self
            .client
            .get(&format!("quotas/projects/{project_id}"))
            .await?;
        Ok(quotas_from_map(response.quotas))
    }

    pub async fn update_project_quotas(
        &self,
        project_id: &str,
        quotas: &BTreeMap<String, Vec<ResourceQuotaOpts>>,
    ) -> Result<()> {
        tracing::info!(project_id, "Updating project quotas");
        self.client
            .patch_unit(
                &format!("quotas/projects/{project_id}"),
                &QuotasEnvelope { quotas },
            )
            .await?;
        Ok(())
    }

    pub async fn create_user(&self, opts: &UserOpts) -> Result<User> {
        tracing::info!(name = %opts.name, "Creating user");
        let response: UserEnvelope<User> =
            self.client.post("users", &UserEnvelope { user: opts }).await?;
        Ok(response.user)
    }

    pub async fn get_user(&self, id: &str) -> Result<User> {
        tracing::debug!(id, "Getting user");
        let response: UserEnvelope<User> = self.client.get(&format!("users/{id}")).await?;
        Ok(response.user)
    }

    pub async fn update_user(&self, id: &str, opts: &UserOpts) -> Result<()> {
        tracing::info!(id, name = %opts.name, "Updating user");
        self.client
            .patch_unit(&format!("users/{id}"), &UserEnvelope { user: opts })
            .await?;
        Ok(())
    }

    pub async fn delete_user(&self, id: &str) -> Result<()> {
        tracing::info!(id, "Deleting user");
        self.client.delete(&format!("users/{id}")).await?;
        Ok(())
    }

    pub async fn create_subnet(&self, project_id: &str, opts: SubnetOpts) -> Result<Subnet> {
        tracing::info!(project_id, region = %opts.region, "Creating subnet");
        let response: SubnetsResponse = self
            .client
            .post(
                &format!("subnets/projects/{project_id}"),
                &SubnetsRequest { subnets: &[opts] },
            )
            .await?;
        first_created(response.subnets, "subnet")
    }

    pub async fn get_subnet(&self, id: &str) -> Result<Subnet> {
        tracing::debug!(id, "Getting subnet");
        let response: SubnetResponse = self.client.get(&format!("subnets/{id}")).await?;
        Ok(response.subnet)
    }

    pub async fn delete_subnet(&self, id: &str) -> Result<()> {
        tracing::info!(id, "Deleting subnet");
        self.client.delete(&format!("subnets/{id}")).await?;
        Ok(())
    }

    pub async fn create_floating_ip(&self, project_id: &str, opts: FloatingIpOpts) -> Result<FloatingIp> {
        tracing::info!(project_id, region = %opts.region, "Creating floating IP");
        let response: FloatingIpsResponse = self
            .client
            .post(
                &format!("floatingips/projects/{project_id}"),
                &FloatingIpsRequest { floatingips: &[opts] },
            )
            .await?;
        first_created(response.floatingips, "floating IP")
    }

    pub async fn get_floating_ip(&self, id: &str) -> Result<FloatingIp> {
        tracing::debug!(id, "Getting floating IP");
        let response: FloatingIpResponse = self.client.get(&format!("floatingips/{id}")).await?;
        Ok(response.floatingip)
    }

    pub async fn delete_floating_ip(&self, id: &str) -> Result<()> {
        tracing::info!(id, "Deleting floating IP");
        self.client.delete(&format!("floatingips/{id}")).await?;
        Ok(())
    }

    pub async fn create_license(&self, project_id: &str, opts: LicenseOpts) -> Result<License> {
        tracing::info!(project_id, region = %opts.region, license_type = %opts.license_type, "Creating license");
        let response: LicensesResponse = self
            .client
            .post(
                &format!("licenses/projects/{project_id}"),
                &LicensesRequest { licenses: &[opts] },
            )
            .await?;
        first_created(response.licenses, "license")
    }

    pub async fn get_license(&self, id: &str) -> Result<License> {
        tracing::debug!(id, "Getting license");
        let response: LicenseResponse = self.client.get(&format!("licenses/{id}")).await?;
        Ok(response.license)
    }

    pub async fn delete_license(&self, id: &str) -> Result<()> {
        tracing::info!(id, "Deleting license");
        self.client.delete(&format!("licenses/{id}")).await?;
        Ok(())
    }

    pub async fn create_keypair(&self, opts: &KeypairOpts) -> Result<Vec<Keypair>> {
        tracing::info!(name = %opts.name, user_id = %opts.user_id, "Creating keypair");
        let response: KeypairCreateResponse = self
            .client
            .post("keypairs", &KeypairRequest { keypair: opts })
            .await?;
        Ok(response.keypair)
    }

    pub async fn list_keypairs(&self) -> Result<Vec<Keypair>> {
        tracing::debug!("Listing keypairs");
        let response: KeypairsResponse = self.client.get("keypairs").await?;
        Ok(response.keypairs)
    }

    pub async fn delete_keypair(&self, name: &str, user_id: &str) -> Result<()> {
        tracing::info!(name, user_id, "Deleting keypair");
        self.client
            .delete(&format!("keypairs/{name}/users/{user_id}"))
            .await?;
        Ok(())
    }

    /// Issue a Keystone token scoped to the project.
    pub async fn create_token(&self, project_id: &str) -> Result<String> {
        tracing::info!(project_id, "Creating project token");
        let response: TokenResponse = self
            .client
            .post(
                "tokens",
                &TokenRequest {
                    token: TokenOpts { project_id },
                },
            )
            .await?;
        Ok(response.token.id)
    }
}
