//! Selectel VPC resources
//!
//! Handlers for the resell v2 API:
//!
//! - `selectel_vpc_project_v2` (with quotas, theme and custom URL)
//! - `selectel_vpc_user_v2`
//! - `selectel_vpc_subnet_v2`
//! - `selectel_vpc_floatingip_v2`
//! - `selectel_vpc_license_v2`
//! - `selectel_vpc_keypair_v2`
//!
//! The crate also issues project-scoped tokens for the services that need
//! them (MKS, DBaaS), either via Keystone credentials or via the resell API.
//!
//! # Example
//!
//! ```ignore
//! use selectel_cloud_vpc::project_token;
//!
//! let token = project_token(&ctx, "b63ab68796e34858befb8fa2a8b1e12a").await?;
//! ```

pub mod client;
pub mod error;
pub mod floating_ip;
pub mod identity;
pub mod keypair;
pub mod license;
pub mod project;
pub mod quota;
pub mod subnet;
pub mod user;

pub use client::ResellClient;
pub use error::{Result, VpcError};
pub use floating_ip::{FloatingIpHandler, FloatingIpSpec, FloatingIpState};
pub use identity::{keystone_token, project_token};
pub use keypair::{KeypairHandler, KeypairSpec, KeypairState, keypair_id, parse_keypair_id};
pub use license::{LicenseHandler, LicenseSpec, LicenseState};
pub use project::{ProjectHandler, ProjectSpec, ProjectState};
pub use quota::{Quota, QuotaSpec, ResourceQuotaEntity, free_quota};
pub use subnet::{IpVersion, SubnetHandler, SubnetSpec, SubnetState, prefix_length_from_cidr};
pub use user::{UserHandler, UserSpec, UserState};
