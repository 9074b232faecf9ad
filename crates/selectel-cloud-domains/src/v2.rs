//! Domains v2 zone and rrset lookup
//!
//! The v2 API lists zones and rrsets with a substring `filter` and
//! `limit`/`offset` pagination. Lookups walk the pages until an exact name
//! match turns up or `next_offset` comes back as zero. An offset that does
//! not move forward is an error.

use crate::error::{DomainsError, Result};
use selectel_cloud::{HEADER_X_AUTH_TOKEN, ProviderContext, ServiceClient};
use selectel_cloud_vpc::project_token;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

pub const DEFAULT_ENDPOINT: &str = "https://api.selectel.ru/domains/v2";

const PAGE_LIMIT: &str = "1000";

/// One page of a v2 listing
#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next_offset: u64,
    #[serde(rename = "result", default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordItem {
    pub content: String,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rrset {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub rrset_type: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub records: Vec<RecordItem>,
}

#[derive(Debug, Clone)]
pub struct DomainsV2Client {
    client: ServiceClient,
}

impl DomainsV2Client {
    pub fn new(http: reqwest::Client, endpoint: &str, token: &str) -> Self {
        Self {
            client: ServiceClient::new(http, endpoint, HEADER_X_AUTH_TOKEN, token),
        }
    }

    /// Client authenticated with a token scoped to `project_id`.
    pub async fn for_project(ctx: &ProviderContext, project_id: &str) -> Result<Self> {
        let token = project_token(ctx, project_id).await?;
        let endpoint = ctx.endpoint_override("domains_v2").unwrap_or(DEFAULT_ENDPOINT);
        Ok(Self::new(ctx.http().clone(), endpoint, &token))
    }

    async fn page<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<List<T>> {
        Ok(self.client.get_with_query(path, query).await?)
    }

    /// Walk the listing at `path` and return the first item accepted by `matches`.
    async fn find<T, F>(&self, path: &str, filter: &[(&str, String)], matches: F) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let mut offset: u64 = 0;
        loop {
            let mut query = filter.to_vec();
            query.push(("limit", PAGE_LIMIT.to_string()));
            query.push(("offset", offset.to_string()));

            let page: List<T> = self.page(path, &query).await?;
            if let Some(found) = page.items.into_iter().find(|item| matches(item)) {
                return Ok(Some(found));
            }
            if page.next_offset == 0 {
                return Ok(None);
            }
            if page.next_offset <= offset {
                return Err(DomainsError::StalledPagination {
                    path: path.to_string(),
                    offset,
                    next_offset: page.next_offset,
                });
            }
            offset = page.next_offset;
        }
    }

    pub async fn zone_by_name(&self, name: &str) -> Result<Zone> {
        tracing::debug!(name, "Looking up zone");
        self.find("zones", &[("filter", name.to_string())], |zone: &Zone| zone.name == name)
            .await?
            .ok_or_else(|| DomainsError::ZoneNotFound(name.to_string()))
    }

    pub async fn rrset_by_name_and_type(&self, zone_id: &str, name: &str, rrset_type: &str) -> Result<Rrset> {
        tracing::debug!(zone_id, name, rrset_type, "Looking up rrset");
        let filter = [
            ("name", name.to_string()),
            ("rrset_types", rrset_type.to_string()),
        ];
        self.find(&format!("zones/{zone_id}/rrset"), &filter, |rrset: &Rrset| {
            rrset.name == name && rrset.rrset_type == rrset_type
        })
        .await?
        .ok_or_else(|| DomainsError::RrsetNotFound {
            name: name.to_string(),
            rrset_type: rrset_type.to_string(),
        })
    }
}
