//! Selectel Managed Kubernetes
//!
//! The `selectel_mks_cluster_v1` resource: clusters with nested nodegroups,
//! Kubernetes version upgrades and project quota checks.
//!
//! Every cluster change is followed by a wait until the cluster is `ACTIVE`
//! again, so nodegroup changes are applied strictly one at a time.

pub mod client;
pub mod cluster;
pub mod error;
pub mod kube_version;
pub mod nodegroup;
pub mod quota;

pub use client::{KubeVersionView, MksClient, Taint, TaintEffect};
pub use cluster::{CLUSTER_REGIONS, ClusterHandler, ClusterSpec, ClusterState};
pub use error::{MksError, Result};
pub use kube_version::UpgradeStep;
pub use nodegroup::{NodegroupSpec, NodegroupState, parse_id, plan_nodegroups};
