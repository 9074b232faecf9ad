//! Kubernetes version parsing and the upgrade step function
//!
//! Versions are `major.minor.patch` with an optional `v` prefix. A cluster
//! moves forward one step at a time: either to the latest patch of its
//! current minor version, or to the latest patch of the next minor version.

use crate::client::KubeVersionView;
use crate::error::{MksError, Result};
use std::collections::BTreeMap;

fn parts(version: &str) -> Vec<&str> {
    normalize(version).split('.').collect()
}

fn invalid(version: &str, reason: &'static str) -> MksError {
    MksError::InvalidKubeVersion {
        version: normalize(version).to_string(),
        reason,
    }
}

/// Version without the `v` prefix.
pub fn normalize(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

pub fn major(version: &str) -> Result<u32> {
    parts(version)[0]
        .parse()
        .map_err(|_| invalid(version, "major part is not an integer number"))
}

pub fn minor(version: &str) -> Result<u32> {
    let parts = parts(version);
    let part = parts
        .get(1)
        .ok_or_else(|| invalid(version, "expected to have major and minor version parts"))?;
    part.parse()
        .map_err(|_| invalid(version, "minor part is not an integer number"))
}

pub fn patch(version: &str) -> Result<u32> {
    let parts = parts(version);
    let part = parts.get(2).ok_or_else(|| {
        invalid(
            version,
            "expected to have major, minor and patch version parts",
        )
    })?;
    part.parse()
        .map_err(|_| invalid(version, "patch part is not an integer number"))
}

/// `major.minor` of a version.
pub fn trim_to_minor(version: &str) -> Result<String> {
    Ok(format!("{}.{}", major(version)?, minor(version)?))
}

/// `major.minor` of the next minor version.
pub fn next_minor(version: &str) -> Result<String> {
    Ok(format!("{}.{}", major(version)?, minor(version)? + 1))
}

/// Latest available patch version for every `major.minor`.
pub fn latest_patch_versions(versions: &[KubeVersionView]) -> Result<BTreeMap<String, String>> {
    let mut latest: BTreeMap<String, String> = BTreeMap::new();
    for view in versions {
        let key = trim_to_minor(&view.version)?;
        let candidate = patch(&view.version)?;
        let newer = match latest.get(&key) {
            Some(current) => candidate > patch(current)?,
            None => true,
        };
        if newer {
            latest.insert(key, normalize(&view.version).to_string());
        }
    }
    Ok(latest)
}

/// Version with the highest minor part.
pub fn latest_version(versions: &[KubeVersionView]) -> Result<Option<String>> {
    let mut latest: Option<&str> = None;
    for view in versions {
        latest = match latest {
            Some(current) if minor(current)? >= minor(&view.version)? => Some(current),
            _ => Some(view.version.as_str()),
        };
    }
    Ok(latest.map(str::to_string))
}

/// Version flagged as the default, if any.
pub fn default_version(versions: &[KubeVersionView]) -> Option<String> {
    versions
        .iter()
        .rev()
        .find(|v| v.is_default)
        .map(|v| v.version.clone())
}

/// Whether a change from `current` to `desired` should be ignored.
///
/// Clusters are never downgraded, so a lower desired version is not a
/// change. Unparseable versions are never suppressed.
pub fn suppress_diff(current: &str, desired: &str) -> bool {
    let compare = |f: fn(&str) -> Result<u32>| -> Option<std::cmp::Ordering> {
        match (f(current), f(desired)) {
            (Ok(c), Ok(d)) => Some(d.cmp(&c)),
            (Err(err), _) | (_, Err(err)) => {
                tracing::debug!(%err, current, desired, "Unable to compare kube versions");
                None
            }
        }
    };

    use std::cmp::Ordering::*;
    for part in [major, minor] {
        match compare(part) {
            None | Some(Greater) => return false,
            Some(Less) => return true,
            Some(Equal) => {}
        }
    }
    matches!(compare(patch), Some(Less))
}

/// Single upgrade call needed to reach the desired version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStep {
    Minor,
    Patch,
}

/// Decide which upgrade brings `current` to `desired`, given the latest
/// patch version of every available minor version.
pub fn plan_upgrade(
    current: &str,
    desired: &str,
    latest_patches: &BTreeMap<String, String>,
) -> Result<UpgradeStep> {
    let (current, desired) = (normalize(current), normalize(desired));

    if major(desired)? != major(current)? {
        return Err(MksError::Upgrade(format!(
            "current version {current} can't be upgraded to version {desired}"
        )));
    }

    let current_minor = trim_to_minor(current)?;
    if trim_to_minor(desired)? != current_minor {
        let latest = latest_patches.get(&next_minor(current)?).ok_or_else(|| {
            MksError::Upgrade(format!(
                "the cluster is already on the latest available minor version: {current_minor}"
            ))
        })?;
        if desired != latest.as_str() {
            return Err(MksError::Upgrade(format!(
                "current version {current} can't be upgraded to version {desired}, the latest available version is: {latest}"
            )));
        }
        return Ok(UpgradeStep::Minor);
    }

    let latest = latest_patches.get(&current_minor).ok_or_else(|| {
        MksError::Upgrade(format!(
            "unable to find the latest patch version for the current minor version {current_minor}"
        ))
    })?;
    if desired != latest.as_str() {
        return Err(MksError::Upgrade(format!(
            "current version {current} can't be upgraded to version {desired}, the latest available patch version is: {latest}"
        )));
    }
    Ok(UpgradeStep::Patch)
}
