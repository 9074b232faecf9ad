//! Selectel resource provider
//!
//! The [`Provider`] registry maps every resource type name to its handler,
//! and [`load_config`] builds the validated configuration the handlers run
//! with. The `terraform-provider-selectel` binary drives both from the
//! command line.

pub mod provider;

pub use provider::Provider;

use selectel_config::{ProviderConfig, RawConfig};
use std::path::Path;

/// Environment variables overlaid on the YAML file at `path`, or on the
/// default provider config file when no path is given.
pub fn load_config(path: Option<&Path>) -> selectel_config::Result<ProviderConfig> {
    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading provider config file");
            RawConfig::from_env()
                .or(RawConfig::from_yaml_file(path)?)
                .validate()
        }
        None => selectel_config::load(),
    }
}
