//! VPC error types

use selectel_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VpcError {
    #[error("got invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("error reading prefix length from '{value}': {source}")]
    InvalidPrefixLength {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("got error parsing keypair ID: {0}")]
    InvalidKeypairId(String),

    #[error("{0} missing from create response")]
    EmptyCreateResponse(&'static str),

    #[error("error parsing project quotas: {0}")]
    InvalidQuotas(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("the resell API requires a Selectel token")]
    TokenRequired,

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl From<VpcError> for CloudError {
    fn from(err: VpcError) -> Self {
        match err {
            VpcError::CloudError(inner) => inner,
            other => CloudError::Provider(Box::new(other)),
        }
    }
}

impl From<reqwest::Error> for VpcError {
    fn from(err: reqwest::Error) -> Self {
        VpcError::CloudError(err.into())
    }
}

pub type Result<T> = std::result::Result<T, VpcError>;
