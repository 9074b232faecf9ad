//! `selectel_vpc_project_v2`

use crate::client::{Project, ProjectCreateOpts, ProjectUpdateOpts, ResellClient, Theme};
use crate::error::{Result, VpcError};
use crate::quota::{Quota, QuotaSpec, quota_opts, quotas_from_map};
use async_trait::async_trait;
use selectel_cloud::{CloudError, Identified, ProviderContext, ResourceHandler, Scope, Timeouts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const OBJECT: &str = "project";

/// Declared project
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProjectSpec {
    pub name: String,
    #[serde(default)]
    pub custom_url: Option<String>,
    #[serde(default)]
    pub theme: BTreeMap<String, String>,
    #[serde(default)]
    pub auto_quotas: bool,
    #[serde(default)]
    pub quotas: Vec<QuotaSpec>,
}

/// Observed project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectState {
    pub id: String,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub custom_url: String,
    pub theme: BTreeMap<String, String>,
    /// Every quota applied to the project, including ones not declared
    pub all_quotas: Vec<Quota>,
}

impl Identified for ProjectState {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<Project> for ProjectState {
    fn from(project: Project) -> Self {
        Self {
            custom_url: url_without_scheme(&project.custom_url),
            theme: flatten_theme(&project.theme),
            all_quotas: quotas_from_map(project.quotas),
            id: project.id,
            name: project.name,
            url: project.url,
            enabled: project.enabled,
        }
    }
}

/// Strip the scheme and trailing slash the API adds to custom URLs.
pub fn url_without_scheme(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.trim_end_matches('/').to_string()
}

fn flatten_theme(theme: &Theme) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    if let Some(color) = theme.color.as_ref().filter(|c| !c.is_empty()) {
        flat.insert("color".to_string(), color.clone());
    }
    if let Some(logo) = theme.logo.as_ref().filter(|l| !l.is_empty()) {
        flat.insert("logo".to_string(), logo.clone());
    }
    flat
}

fn expand_theme(theme: &BTreeMap<String, String>) -> Theme {
    Theme {
        color: Some(theme.get("color").cloned().unwrap_or_default()),
        logo: Some(theme.get("logo").cloned().unwrap_or_default()),
    }
}

/// Project-level changes between two declarations.
pub fn project_update_opts(old: &ProjectSpec, new: &ProjectSpec) -> ProjectUpdateOpts {
    let mut opts = ProjectUpdateOpts::default();
    if old.name != new.name {
        opts.name = Some(new.name.clone());
    }
    if old.custom_url != new.custom_url {
        opts.custom_url = Some(new.custom_url.clone().unwrap_or_default());
    }
    if old.theme != new.theme {
        opts.theme = Some(expand_theme(&new.theme));
    }
    opts
}

pub struct ProjectHandler;

impl ProjectHandler {
    async fn fetch(&self, client: &ResellClient, id: &str) -> Result<Option<ProjectState>> {
        match client.get_project(id).await {
            Ok(project) => Ok(Some(project.into())),
            Err(VpcError::CloudError(err)) if err.is_not_found() => Ok(None),
            Err(err) => Err(CloudError::getting(OBJECT, id, err).into()),
        }
    }
}

#[async_trait]
impl ResourceHandler for ProjectHandler {
    type Spec = ProjectSpec;
    type State = ProjectState;
    type Error = VpcError;

    fn type_name(&self) -> &'static str {
        "selectel_vpc_project_v2"
    }

    fn scope(&self, _spec: &ProjectSpec) -> Scope {
        Scope::default()
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        spec: &ProjectSpec,
        _timeouts: &Timeouts,
    ) -> Result<ProjectState> {
        let client = ResellClient::from_context(ctx)?;
        let opts = ProjectCreateOpts {
            name: spec.name.clone(),
            quotas: quota_opts(&spec.quotas)?,
            auto_quotas: spec.auto_quotas,
        };

        let project = client
            .create_project(&opts)
            .await
            .map_err(|e| CloudError::creating(OBJECT, e))?;

        // Custom URL and theme are only accepted by update.
        let extra = project_update_opts(
            &ProjectSpec {
                custom_url: None,
                theme: BTreeMap::new(),
                ..spec.clone()
            },
            spec,
        );
        if !extra.is_empty() {
            client
                .update_project(&project.id, &extra)
                .await
                .map_err(|e| CloudError::updating(OBJECT, &project.id, e))?;
        }

        self.fetch(&client, &project.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(project.id.clone()).into())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _scope: &Scope,
        _declared: Option<&ProjectSpec>,
    ) -> Result<Option<ProjectState>> {
        let client = ResellClient::from_context(ctx)?;
        self.fetch(&client, id).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &ProjectSpec,
        new: &ProjectSpec,
        _timeouts: &Timeouts,
    ) -> Result<ProjectState> {
        let client = ResellClient::from_context(ctx)?;

        let opts = project_update_opts(old, new);
        if !opts.is_empty() {
            client
                .update_project(id, &opts)
                .await
                .map_err(|e| CloudError::updating(OBJECT, id, e))?;
        }

        if old.quotas != new.quotas {
            let quotas = quota_opts(&new.quotas)?;
            client
                .update_project_quotas(id, &quotas)
                .await
                .map_err(|e| CloudError::updating("project quotas", id, e))?;
        }

        self.fetch(&client, id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _spec: &ProjectSpec,
        _timeouts: &Timeouts,
    ) -> Result<()> {
        let client = ResellClient::from_context(ctx)?;
        match client.delete_project(id).await {
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
    use crate::quota::ResourceQuotaSpec;
    use httpmock::prelude::*;
    use httpmock::Method::PATCH;
    use selectel_config::RawConfig;
    use serde_json::json;

    fn spec(name: &str) -> ProjectSpec {
        ProjectSpec {
            name: name.into(),
            custom_url: None,
            theme: BTreeMap::new(),
            auto_quotas: false,
            quotas: vec![],
        }
    }

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
    fn test_url_without_scheme() {
        assert_eq!(url_without_scheme("https://demo.selvpc.ru/"), "demo.selvpc.ru");
        assert_eq!(url_without_scheme("demo.selvpc.ru"), "demo.selvpc.ru");
        assert_eq!(url_without_scheme(""), "");
    }

    #[test]
    fn test_update_opts_only_changed_fields() {
        let old = spec("old");
        let mut new = spec("old");
        new.theme.insert("color".into(), "2753E9".into());

        let opts = project_update_opts(&old, &new);
        assert_eq!(opts.name, None);
        assert_eq!(opts.custom_url, None);
        assert_eq!(
            opts.theme,
            Some(Theme {
                color: Some("2753E9".into()),
                logo: Some(String::new()),
            })
        );
    }

    #[test]
    fn test_unchanged_spec_has_empty_opts() {
        assert!(project_update_opts(&spec("a"), &spec("a")).is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_project_is_gone() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/projects/p-1");
            then.status(404);
        });

        let state = ProjectHandler
            .read(&context(&server), "p-1", &Scope::default(), None)
            .await
            .unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_update_quotas_only() {
        let server = MockServer::start();
        let quotas_mock = server.mock(|when, then| {
            when.method(PATCH)
                .path("/quotas/projects/p-1")
                .json_body(json!({"quotas": {"compute_cores": [{"region": "ru-3", "zone": "ru-3a", "value": 8}]}}));
            then.status(200).json_body(json!({"quotas": {}}));
        });
        let project_mock = server.mock(|when, then| {
            when.method(PATCH).path("/projects/p-1");
            then.status(200);
        });
        server.mock(|when, then| {
            when.method(GET).path("/projects/p-1");
            then.status(200).json_body(json!({"project": {
                "id": "p-1", "name": "demo", "url": "https://demo.selvpc.ru", "enabled": true,
                "custom_url": "https://my.example.com/",
                "quotas": {"compute_cores": [{"region": "ru-3", "zone": "ru-3a", "value": 8, "used": 0}]}
            }}));
        });

        let old = spec("demo");
        let mut new = spec("demo");
        new.quotas = vec![QuotaSpec {
            resource_name: "compute_cores".into(),
            resource_quotas: vec![ResourceQuotaSpec {
                value: 8,
                region: Some("ru-3".into()),
                zone: Some("ru-3a".into()),
            }],
        }];

        let state = ProjectHandler
            .update(&context(&server), "p-1", &old, &new, &Timeouts::default())
            .await
            .unwrap();

        quotas_mock.assert();
        project_mock.assert_hits(0);
        assert_eq!(state.custom_url, "my.example.com");
        assert_eq!(state.all_quotas[0].resource_quotas[0].value, 8);
    }

    #[tokio::test]
    async fn test_delete_missing_project_is_ok() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/projects/p-1");
            then.status(404);
        });

        ProjectHandler
            .delete(&context(&server), "p-1", &spec("demo"), &Timeouts::default())
            .await
            .unwrap();
    }
}
