//! Domains v1 API client
//!
//! Account-wide API authenticated with the Selectel token in `X-Token`.
//! Requests are retried on transport failures and 429/5xx responses.

use crate::error::{DomainsError, Result};
use selectel_cloud::{HEADER_X_TOKEN, ProviderContext, RetryConfig, ServiceClient};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://api.selectel.ru/domains/v1";

/// Domain as returned by the v1 API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Domain {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub create_date: i64,
    #[serde(default)]
    pub change_date: i64,
    #[serde(default)]
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
struct CreateOpts<'a> {
    name: &'a str,
}

#[derive(Debug, Clone)]
pub struct DomainsV1Client {
    client: ServiceClient,
}

impl DomainsV1Client {
    pub fn new(http: reqwest::Client, endpoint: &str, token: &str) -> Self {
        Self {
            client: ServiceClient::new(http, endpoint, HEADER_X_TOKEN, token)
                .with_retry(RetryConfig::default()),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.client = self.client.with_retry(retry);
        self
    }

    /// Client for the configured account token.
    pub fn from_context(ctx: &ProviderContext) -> Result<Self> {
        let token = ctx
            .config()
            .token
            .as_deref()
            .ok_or(DomainsError::MissingToken)?;
        let endpoint = ctx.endpoint_override("domains_v1").unwrap_or(DEFAULT_ENDPOINT);
        Ok(Self::new(ctx.http().clone(), endpoint, token))
    }

    pub async fn create_domain(&self, name: &str) -> Result<Domain> {
        tracing::info!(name, "Creating domain");
        Ok(self.client.post("/", &CreateOpts { name }).await?)
    }

    pub async fn domain(&self, id: i64) -> Result<Domain> {
        tracing::debug!(id, "Getting domain");
        Ok(self.client.get(&format!("/{id}")).await?)
    }

    pub async fn delete_domain(&self, id: i64) -> Result<()> {
        tracing::info!(id, "Deleting domain");
        Ok(self.client.delete(&format!("/{id}")).await?)
    }
}
