//! MKS error types

use selectel_cloud::CloudError;
use selectel_cloud_vpc::VpcError;
use selectel_config::Region;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MksError {
    #[error("kube version {version} is invalid: {reason}")]
    InvalidKubeVersion { version: String, reason: &'static str },

    #[error("{0}")]
    Upgrade(String),

    #[error("got error parsing nodegroup ID: {0}")]
    InvalidNodegroupId(String),

    #[error("nodegroup '{name}' can only be resized in place, but '{field}' changed")]
    NodegroupChanged { name: String, field: &'static str },

    #[error("nodegroup '{0}' has no id, refresh the cluster before changing it")]
    MissingNodegroupId(String),

    #[error("nodegroup name '{0}' is declared more than once")]
    DuplicateNodegroup(String),

    #[error("no Kubernetes versions are available")]
    NoKubeVersions,

    #[error("at least one nodegroup must be specified")]
    NoNodegroups,

    #[error("managed Kubernetes is not available in region {0}")]
    UnsupportedRegion(Region),

    #[error("{0} cannot be changed without recreating the cluster")]
    ForceNew(&'static str),

    #[error("{0}")]
    Quota(String),

    #[error("project_id and region are required")]
    MissingScope,

    #[error(transparent)]
    Vpc(#[from] VpcError),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl From<MksError> for CloudError {
    fn from(err: MksError) -> Self {
        match err {
            MksError::CloudError(inner) => inner,
            MksError::Vpc(inner) => inner.into(),
            other => CloudError::Provider(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, MksError>;
