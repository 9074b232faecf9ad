//! Selectel DNS
//!
//! - `selectel_domains_domain_v1`: account domains through the v1 API, which
//!   takes the account token and retries transient failures.
//! - Zone and rrset lookup by name through the v2 API, which takes a
//!   project-scoped token and paginates its listings.

pub mod domain;
pub mod error;
pub mod v1;
pub mod v2;

pub use domain::{DomainHandler, DomainSpec, DomainState, parse_domain_id};
pub use error::{DomainsError, Result};
pub use v1::{Domain, DomainsV1Client};
pub use v2::{DomainsV2Client, List, RecordItem, Rrset, Zone};
