//! Project-scoped token issuance
//!
//! MKS, DBaaS and domains v2 authenticate with a Keystone token scoped to
//! the resource's project. With Keystone credentials configured the token is
//! obtained by password auth; otherwise the resell API issues it in exchange
//! for the Selectel token.

use crate::client::ResellClient;
use crate::error::{Result, VpcError};
use selectel_cloud::ProviderContext;
use selectel_cloud::http::check_status;
use selectel_config::KeystoneCredentials;
use serde_json::json;

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Issue a token scoped to `project_id`.
pub async fn project_token(ctx: &ProviderContext, project_id: &str) -> Result<String> {
    let config = ctx.config();
    match &config.keystone {
        Some(credentials) => {
            keystone_token(ctx.http(), &config.os_endpoint, credentials, project_id).await
        }
        None => ResellClient::from_context(ctx)?.create_token(project_id).await,
    }
}

/// Keystone v3 password authentication scoped to a project.
pub async fn keystone_token(
    http: &reqwest::Client,
    os_endpoint: &str,
    credentials: &KeystoneCredentials,
    project_id: &str,
) -> Result<String> {
    let url = format!("{}/auth/tokens", os_endpoint.trim_end_matches('/'));
    let body = json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": credentials.user,
                        "domain": {"name": credentials.domain_name},
                        "password": credentials.password,
                    }
                }
            },
            "scope": {"project": {"id": project_id}}
        }
    });

    tracing::debug!(user = %credentials.user, project_id, "Requesting Keystone token");
    let response = http.post(&url).json(&body).send().await?;
    let response = check_status(response).await?;

    response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            VpcError::AuthenticationFailed(format!("{SUBJECT_TOKEN_HEADER} header is missing"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use selectel_config::RawConfig;

    fn credentials() -> KeystoneCredentials {
        KeystoneCredentials {
            user: "user".into(),
            password: "password".into(),
            domain_name: "123456".into(),
        }
    }

    #[tokio::test]
    async fn test_keystone_token_from_header() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/tokens")
                .body_contains("\"domain\":{\"name\":\"123456\"}")
                .body_contains("\"project\":{\"id\":\"p-1\"}");
            then.status(201)
                .header("X-Subject-Token", "scoped-token")
                .json_body(serde_json::json!({"token": {}}));
        });

        let token = keystone_token(&reqwest::Client::new(), &server.base_url(), &credentials(), "p-1")
            .await
            .unwrap();
        assert_eq!(token, "scoped-token");
        mock.assert();
    }

    #[tokio::test]
    async fn test_keystone_token_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth/tokens");
            then.status(401)
                .json_body(serde_json::json!({"error": {"message": "The request you have made requires authentication."}}));
        });

        let err = keystone_token(&reqwest::Client::new(), &server.base_url(), &credentials(), "p-1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires authentication"));
    }

    #[tokio::test]
    async fn test_project_token_uses_resell_without_credentials() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/tokens").header("X-Token", "sel-token");
            then.status(201).json_body(serde_json::json!({"token": {"id": "from-resell"}}));
        });

        let config = RawConfig {
            token: Some("sel-token".into()),
            endpoint: Some(server.base_url()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let ctx = ProviderContext::new(config);

        assert_eq!(project_token(&ctx, "p-1").await.unwrap(), "from-resell");
        mock.assert();
    }
}
