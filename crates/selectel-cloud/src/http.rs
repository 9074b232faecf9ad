//! Shared HTTP client for the Selectel service APIs
//!
//! Each service (resell, MKS, DBaaS, domains) talks JSON over HTTPS with a
//! token in a service-specific header. [`ServiceClient`] carries the
//! endpoint, the header and the token, and maps non-2xx responses to
//! [`CloudError::Api`].

use crate::error::{CloudError, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Header used by the resell and domains v1 APIs
pub const HEADER_X_TOKEN: &str = "X-Token";

/// Header used by project-scoped APIs (MKS, DBaaS, domains v2)
pub const HEADER_X_AUTH_TOKEN: &str = "X-Auth-Token";

/// Retry configuration for idempotent requests
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first request
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Delay before retry `attempt`, capped at `max_delay`.
    ///
    /// Overflowing, negative or NaN products saturate to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.min(32) as i32);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// JSON API client bound to one endpoint and token
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    endpoint: String,
    auth_header: &'static str,
    token: String,
    retry: Option<RetryConfig>,
}

impl ServiceClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        auth_header: &'static str,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth_header,
            token: token.into(),
            retry: None,
        }
    }

    /// Retry transport failures and 429/5xx responses
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn builder(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(self.auth_header, &self.token)
    }

    /// Send a request, retrying when configured, and reject non-2xx responses.
    pub async fn execute<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = self.retry.as_ref().map_or(0, |r| r.max_attempts);
        let mut attempt = 0;

        loop {
            let outcome = build().send().await;
            let retryable = match &outcome {
                Ok(response) => {
                    let status = response.status();
                    status.is_server_error() || status.as_u16() == 429
                }
                Err(err) => !err.is_builder(),
            };

            if retryable && attempt < max_attempts {
                if let Some(retry) = &self.retry {
                    let delay = retry.delay_for_attempt(attempt);
                    tracing::debug!(attempt, ?delay, "Retrying request");
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
                continue;
            }

            return check_status(outcome?).await;
        }
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(%method, path, "API request");
        let response = self
            .execute(|| {
                let builder = self.builder(method.clone(), path);
                match body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            })
            .await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_unit<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        tracing::debug!(%method, path, "API request");
        self.execute(|| {
            let builder = self.builder(method.clone(), path);
            match body {
                Some(body) => builder.json(body),
                None => builder,
            }
        })
        .await?;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json::<(), T>(Method::GET, path, None).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        tracing::debug!(path, ?query, "API request");
        let response = self
            .execute(|| self.builder(Method::GET, path).query(query))
            .await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, path, Some(body)).await
    }

    pub async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send_unit(Method::POST, path, Some(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::PUT, path, Some(body)).await
    }

    pub async fn put_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send_unit(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::PATCH, path, Some(body)).await
    }

    pub async fn patch_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send_unit(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send_unit::<()>(Method::DELETE, path, None).await
    }

    pub async fn delete_with_body<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send_unit(Method::DELETE, path, Some(body)).await
    }
}

/// Map a non-2xx response to [`CloudError::Api`].
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    Err(CloudError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Pull a human-readable message out of the error bodies the services return.
///
/// Handles `{"error": {"message": ..}}`, `{"error": ".."}`, `{"message": ..}`
/// and plain text bodies.
fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some(trimmed.to_string());
    };

    let message = match value.get("error") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(error) => error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        None => None,
    };
    message
        .or_else(|| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .or_else(|| Some(trimmed.to_string()))
}
