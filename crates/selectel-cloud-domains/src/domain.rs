//! `selectel_domains_domain_v1`

use crate::error::{DomainsError, Result};
use crate::v1::{Domain, DomainsV1Client};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use serde::{Deserialize, Serialize};

const OBJECT: &str = "domain";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DomainSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainState {
    pub id: String,
    pub name: String,
    pub create_date: i64,
    pub change_date: i64,
    pub user_id: i64,
}

impl Identified for DomainState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<Domain> for DomainState {
    fn from(domain: Domain) -> Self {
        Self {
            id: domain.id.to_string(),
            name: domain.name,
            create_date: domain.create_date,
            change_date: domain.change_date,
            user_id: domain.user_id,
        }
    }
}

/// Domain ids are numeric in the v1 API.
pub fn parse_domain_id(id: &str) -> Result<i64> {
    id.parse().map_err(|source| DomainsError::InvalidId {
        id: id.to_string(),
        source,
    })
}

#[derive(Debug, Default)]
pub struct DomainHandler;

#[async_trait]
impl ResourceHandler for DomainHandler {
    type Spec = DomainSpec;
    type State = DomainState;
    type Error = DomainsError;

    fn type_name(&self) -> &'static str {
        "selectel_domains_domain_v1"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    fn scope(&self, _spec: &DomainSpec) -> Scope {
        Scope::default()
    }

    async fn create(&self, ctx: &ProviderContext, spec: &DomainSpec, _timeouts: &Timeouts) -> Result<DomainState> {
        let client = DomainsV1Client::from_context(ctx)?;
        let domain = client
            .create_domain(&spec.name)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;
        Ok(domain.into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _scope: &Scope,
        _declared: Option<&DomainSpec>,
    ) -> Result<Option<DomainState>> {
        let domain_id = parse_domain_id(id)?;
        let client = DomainsV1Client::from_context(ctx)?;
        match client.domain(domain_id).await {
            Ok(domain) => Ok(Some(domain.into())),
            Err(DomainsError::CloudError(err)) if err.is_not_found() => {
                tracing::debug!(id, "Domain is gone");
                Ok(None)
            }
            Err(err) => Err(CloudError::getting(OBJECT, id, err).into()),
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &DomainSpec,
        new: &DomainSpec,
        _timeouts: &Timeouts,
    ) -> Result<DomainState> {
        if old.name != new.name {
            return Err(DomainsError::ForceNew("name"));
        }
        self.read(ctx, id, &Scope::default(), Some(new))
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, _spec: &DomainSpec, _timeouts: &Timeouts) -> Result<()> {
        let domain_id = parse_domain_id(id)?;
        let client = DomainsV1Client::from_context(ctx)?;
        client
            .delete_domain(domain_id)
            .await
            .map_err(|e| CloudError::deleting(OBJECT, id, e).into())
    }

    async fn import_scope(&self, _ctx: &ProviderContext) -> Result<Scope> {
        Ok(Scope::default())
    }
}
