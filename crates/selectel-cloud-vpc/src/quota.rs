//! Project quotas
//!
//! The resell API reports quotas as a map from resource name to a list of
//! per-region/zone entries. Declared quotas use the same shape as a list.

use crate::error::{Result, VpcError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quota entries for a single region/zone as reported by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuotaEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub used: i64,
}

/// Wire form of quotas: resource name to entries
pub type QuotaMap = BTreeMap<String, Vec<ResourceQuotaEntity>>;

/// Observed quota for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub resource_name: String,
    pub resource_quotas: Vec<ResourceQuotaEntity>,
}

/// Declared quota for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSpec {
    pub resource_name: String,
    pub resource_quotas: Vec<ResourceQuotaSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuotaSpec {
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

/// Entry sent when updating project quotas
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceQuotaOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub value: i64,
}

/// Flatten the API map into a list sorted by resource name.
pub fn quotas_from_map(map: QuotaMap) -> Vec<Quota> {
    map.into_iter()
        .map(|(resource_name, resource_quotas)| Quota {
            resource_name,
            resource_quotas,
        })
        .collect()
}

/// Convert declared quotas into update options.
pub fn quota_opts(specs: &[QuotaSpec]) -> Result<BTreeMap<String, Vec<ResourceQuotaOpts>>> {
    let mut opts = BTreeMap::new();
    for spec in specs {
        if spec.resource_name.is_empty() {
            return Err(VpcError::InvalidQuotas(
                "resource_name must not be empty".to_string(),
            ));
        }
        if spec.resource_quotas.is_empty() {
            return Err(VpcError::InvalidQuotas(format!(
                "resource_quotas for {} must not be empty",
                spec.resource_name
            )));
        }
        let entries = spec
            .resource_quotas
            .iter()
            .map(|q| {
                if q.value < 0 {
                    return Err(VpcError::InvalidQuotas(format!(
                        "negative value {} for {}",
                        q.value, spec.resource_name
                    )));
                }
                Ok(ResourceQuotaOpts {
                    region: q.region.clone(),
                    zone: q.zone.clone(),
                    value: q.value,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        opts.insert(spec.resource_name.clone(), entries);
    }
    Ok(opts)
}

/// Free amount of `resource` in the given region (and zone, when set).
///
/// Entries without a zone apply to the whole region.
pub fn free_quota(quotas: &[Quota], resource: &str, region: &str, zone: Option<&str>) -> Option<i64> {
    let quota = quotas.iter().find(|q| q.resource_name == resource)?;
    quota
        .resource_quotas
        .iter()
        .find(|e| {
            e.region.as_deref() == Some(region)
                && match (zone, e.zone.as_deref()) {
                    (Some(wanted), Some(actual)) => wanted == actual,
                    (_, None) => true,
                    (None, Some(_)) => false,
                }
        })
        .map(|e| e.value - e.used)
}
