//! Domains error types

use selectel_cloud::CloudError;
use selectel_cloud_vpc::VpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainsError {
    #[error("the domains API requires a token, set SEL_TOKEN")]
    MissingToken,

    #[error("failed to parse domain ID '{id}': {source}")]
    InvalidId {
        id: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("zone with name '{0}' not found")]
    ZoneNotFound(String),

    #[error("rrset with name '{name}' and type '{rrset_type}' not found")]
    RrsetNotFound { name: String, rrset_type: String },

    #[error("listing '{path}' returned next_offset {next_offset} after offset {offset}")]
    StalledPagination {
        path: String,
        offset: u64,
        next_offset: u64,
    },

    #[error("{0} cannot be changed without recreating the resource")]
    ForceNew(&'static str),

    #[error(transparent)]
    Vpc(#[from] VpcError),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl From<DomainsError> for CloudError {
    fn from(err: DomainsError) -> Self {
        match err {
            DomainsError::CloudError(inner) => inner,
            DomainsError::Vpc(inner) => inner.into(),
            other => CloudError::Provider(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainsError>;
