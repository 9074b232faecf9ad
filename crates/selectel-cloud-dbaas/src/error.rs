//! DBaaS error types

use selectel_cloud::CloudError;
use selectel_cloud_vpc::VpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbaasError {
    #[error("couldn't get datastore type with id {0}")]
    DatastoreTypeLookup(String),

    #[error("{0}")]
    DatastoreType(String),

    #[error("{0}")]
    FloatingIps(String),

    #[error("{0}")]
    Invalid(String),

    #[error("restore.target_time '{value}' is not an RFC 3339 timestamp: {source}")]
    InvalidRestoreTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("{0} cannot be changed without recreating the resource")]
    ForceNew(&'static str),

    #[error("project_id and region are required")]
    MissingScope,

    #[error(transparent)]
    Vpc(#[from] VpcError),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl DbaasError {
    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, Self::CloudError(err) if err.is_not_found())
    }
}

impl From<DbaasError> for CloudError {
    fn from(err: DbaasError) -> Self {
        match err {
            DbaasError::CloudError(inner) => inner,
            DbaasError::Vpc(inner) => inner.into(),
            other => CloudError::Provider(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbaasError>;
