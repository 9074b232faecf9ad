//! Cloud provider error types

use std::time::Duration;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Validation(String),

    #[error(
        "timeout while waiting for {id} to become {target} (last status: '{last_status}', timeout: {timeout:?})"
    )]
    Timeout {
        id: String,
        target: String,
        last_status: String,
        timeout: Duration,
    },

    #[error("unexpected status '{status}' for {id}, wanted {target}")]
    UnexpectedState {
        id: String,
        status: String,
        target: String,
    },

    #[error("error {verb} {object}{}: {source}", id_suffix(.id))]
    Operation {
        verb: &'static str,
        object: &'static str,
        id: Option<String>,
        #[source]
        source: Box<CloudError>,
    },

    #[error(transparent)]
    Provider(Box<dyn std::error::Error + Send + Sync>),

    #[error("Configuration error: {0}")]
    Config(#[from] selectel_config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn id_suffix(id: &Option<String>) -> String {
    id.as_deref().map(|id| format!(" {id}")).unwrap_or_default()
}

impl CloudError {
    pub fn creating(object: &'static str, source: impl Into<CloudError>) -> Self {
        Self::operation("creating", object, None, source)
    }

    pub fn getting(object: &'static str, id: &str, source: impl Into<CloudError>) -> Self {
        Self::operation("getting", object, Some(id), source)
    }

    pub fn updating(object: &'static str, id: &str, source: impl Into<CloudError>) -> Self {
        Self::operation("updating", object, Some(id), source)
    }

    pub fn deleting(object: &'static str, id: &str, source: impl Into<CloudError>) -> Self {
        Self::operation("deleting", object, Some(id), source)
    }

    pub fn waiting(object: &'static str, id: &str, source: impl Into<CloudError>) -> Self {
        Self::operation("waiting for", object, Some(id), source)
    }

    fn operation(
        verb: &'static str,
        object: &'static str,
        id: Option<&str>,
        source: impl Into<CloudError>,
    ) -> Self {
        Self::Operation {
            verb,
            object,
            id: id.map(str::to_string),
            source: Box::new(source.into()),
        }
    }

    /// HTTP status carried by this error, looking through operation wrappers.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            Self::Operation { source, .. } => source.status_code(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound(_)) || self.status_code() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
