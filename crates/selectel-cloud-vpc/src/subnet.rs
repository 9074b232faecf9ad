//! `selectel_vpc_subnet_v2` and CIDR helpers

use crate::client::{ResellClient, Server, Subnet, SubnetOpts};
use crate::error::{Result, VpcError};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use selectel_config::Region;
use serde::{Deserialize, Serialize};

const OBJECT: &str = "subnet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    #[default]
    Ipv4,
    Ipv6,
}

impl IpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::Ipv4 => "ipv4",
            IpVersion::Ipv6 => "ipv6",
        }
    }

    /// Selectel has no IPv6 subnets shorter than /33, so anything longer than
    /// 32 bits of prefix is IPv6.
    pub fn from_prefix_length(prefix_length: u32) -> Self {
        if prefix_length > 32 {
            IpVersion::Ipv6
        } else {
            IpVersion::Ipv4
        }
    }
}

/// Prefix length of a `address/length` CIDR string.
pub fn prefix_length_from_cidr(cidr: &str) -> Result<u32> {
    let parts: Vec<&str> = cidr.split('/').collect();
    if parts.len() != 2 {
        return Err(VpcError::InvalidCidr(cidr.to_string()));
    }
    parts[1]
        .parse::<u32>()
        .map_err(|source| VpcError::InvalidPrefixLength {
            value: parts[1].to_string(),
            source,
        })
}

fn default_prefix_length() -> u32 {
    29
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubnetSpec {
    pub project_id: String,
    pub region: Region,
    #[serde(default)]
    pub ip_version: IpVersion,
    #[serde(default = "default_prefix_length")]
    pub prefix_length: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetState {
    pub id: String,
    pub project_id: String,
    pub region: String,
    pub cidr: String,
    pub network_id: String,
    pub subnet_id: String,
    pub status: String,
    pub prefix_length: u32,
    pub ip_version: IpVersion,
    pub servers: Vec<Server>,
}

impl Identified for SubnetState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl TryFrom<Subnet> for SubnetState {
    type Error = VpcError;

    fn try_from(subnet: Subnet) -> Result<Self> {
        let prefix_length = prefix_length_from_cidr(&subnet.cidr)?;
        Ok(Self {
            id: subnet.id.to_string(),
            project_id: subnet.project_id,
            region: subnet.region,
            cidr: subnet.cidr,
            network_id: subnet.network_id,
            subnet_id: subnet.subnet_id,
            status: subnet.status,
            prefix_length,
            ip_version: IpVersion::from_prefix_length(prefix_length),
            servers: subnet.servers,
        })
    }
}

pub struct SubnetHandler;

impl SubnetHandler {
    async fn fetch(&self, client: &ResellClient, id: &str) -> Result<Option<SubnetState>> {
        match client.get_subnet(id).await {
            Ok(subnet) => Ok(Some(subnet.try_into()?)),
            Err(VpcError::CloudError(err)) if err.is_not_found() => Ok(None),
            Err(err) => Err(CloudError::getting(OBJECT, id, err).into()),
        }
    }
}

#[async_trait]
impl ResourceHandler for SubnetHandler {
    type Spec = SubnetSpec;
    type State = SubnetState;
    type Error = VpcError;

    fn type_name(&self) -> &'static str {
        "selectel_vpc_subnet_v2"
    }

    fn scope(&self, spec: &SubnetSpec) -> Scope {
        Scope::new(spec.project_id.clone(), spec.region)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &SubnetSpec,
        _timeouts: &Timeouts,
    ) -> Result<SubnetState> {
        let client = ResellClient::from_context(ctx)?;
        let opts = SubnetOpts {
            region: spec.region.to_string(),
            quantity: 1,
            ip_version: spec.ip_version.as_str().to_string(),
            prefix_length: spec.prefix_length,
        };
        let subnet = client
            .create_subnet(&spec.project_id, opts)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        subnet.try_into()
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _scope: &Scope,
        _declared: Option<&SubnetSpec>,
    ) -> Result<Option<SubnetState>> {
        let client = ResellClient::from_context(ctx)?;
        self.fetch(&client, id).await
    }

    /// Every declared field forces a new subnet, so update only refreshes.
    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _old: &SubnetSpec,
        _new: &SubnetSpec,
        _timeouts: &Timeouts,
    ) -> Result<SubnetState> {
        let client = ResellClient::from_context(ctx)?;
        self.fetch(&client, id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _spec: &SubnetSpec,
        _timeouts: &Timeouts,
    ) -> Result<()> {
        let client = ResellClient::from_context(ctx)?;
        match client.delete_subnet(id).await {
            Ok(()) => Ok(()),
            Err(VpcError::CloudError(err)) if err.is_not_found() => Ok(()),
            Err(err) => Err(CloudError::deleting(OBJECT, id, err).into()),
        }
    }

    async fn import_scope(&self, _ctx: &ProviderContext) -> Result<Scope> {
        Ok(Scope::default())
    }
}
