//! Per-process provider context handed to every resource handler

use crate::error::Result;
use crate::lock::LockService;
use selectel_config::{ConfigError, ProviderConfig, Region};
use std::collections::HashMap;
use std::sync::Arc;

/// Location of a project- and region-scoped resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub project_id: Option<String>,
    pub region: Option<Region>,
}

impl Scope {
    pub fn new(project_id: impl Into<String>, region: Region) -> Self {
        Self {
            project_id: Some(project_id.into()),
            region: Some(region),
        }
    }
}

/// Validated configuration, lock table and HTTP client shared by handlers
#[derive(Debug, Clone)]
pub struct ProviderContext {
    config: Arc<ProviderConfig>,
    locks: Arc<LockService>,
    http: reqwest::Client,
    endpoint_overrides: HashMap<&'static str, String>,
}

impl ProviderContext {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config: Arc::new(config),
            locks: Arc::new(LockService::new()),
            http: reqwest::Client::new(),
            endpoint_overrides: HashMap::new(),
        }
    }

    /// Share a lock table with another context
    pub fn with_locks(mut self, locks: Arc<LockService>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Point a region-derived service endpoint (`"mks"`, `"dbaas"`,
    /// `"domains_v2"`) at a fixed URL instead.
    pub fn with_endpoint_override(mut self, service: &'static str, url: impl Into<String>) -> Self {
        self.endpoint_overrides.insert(service, url.into());
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn locks(&self) -> &LockService {
        &self.locks
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn endpoint_override(&self, service: &str) -> Option<&str> {
        self.endpoint_overrides.get(service).map(String::as_str)
    }

    /// Scope for importing a project/region-scoped resource by id alone.
    pub fn import_scope(&self) -> Result<Scope> {
        let project_id = self
            .config
            .project_id
            .clone()
            .ok_or(ConfigError::MissingImportSetting("SEL_PROJECT_ID"))?;
        let region = self
            .config
            .region
            .ok_or(ConfigError::MissingImportSetting("SEL_REGION"))?;
        Ok(Scope::new(project_id, region))
    }
}
