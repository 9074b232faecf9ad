//! Project quota checks run before clusters and nodegroups are created

use crate::client::NodegroupCreateOpts;
use crate::error::{MksError, Result};
use selectel_cloud_vpc::{Quota, ResourceQuotaEntity};

fn find<'a>(quotas: &'a [Quota], resource: &str) -> Option<&'a [ResourceQuotaEntity]> {
    quotas
        .iter()
        .find(|q| q.resource_name == resource)
        .map(|q| q.resource_quotas.as_slice())
}

fn quota_error(message: impl Into<String>) -> MksError {
    MksError::Quota(message.into())
}

/// Free regional or zonal cluster slots in `region`.
pub fn check_cluster(quotas: &[Quota], region: &str, zonal: bool) -> Result<()> {
    let (resource, kind) = if zonal {
        ("mks_cluster_zonal", "zonal")
    } else {
        ("mks_cluster_regional", "regional")
    };
    let entries = find(quotas, resource)
        .ok_or_else(|| quota_error(format!("unable to find {resource} quota")))?;

    let mut checked = false;
    for entry in entries.iter().filter(|e| e.region.as_deref() == Some(region)) {
        if entry.value - entry.used <= 0 {
            return Err(quota_error(format!(
                "not enough quota to create {kind} k8s cluster"
            )));
        }
        checked = true;
    }
    if !checked {
        return Err(quota_error(
            "unable to check regional and zonal k8s cluster quotas for a given region",
        ));
    }
    Ok(())
}

/// Free CPU, RAM and volume in the nodegroup's zone for all of its nodes.
pub fn check_nodegroup(quotas: &[Quota], opts: &NodegroupCreateOpts) -> Result<()> {
    let cpu = find(quotas, "compute_cores").ok_or_else(|| quota_error("unable to find CPU quota"))?;
    let ram = find(quotas, "compute_ram").ok_or_else(|| quota_error("unable to find RAM quota"))?;

    let volume_type = if opts.local_volume {
        "local"
    } else {
        let declared = opts.volume_type.as_deref().unwrap_or_default();
        match declared.split('.').next().unwrap_or_default() {
            kind @ ("fast" | "universal" | "basic") => kind,
            _ => {
                return Err(quota_error(format!(
                    "expected 'fast.<zone>', 'universal.<zone>' or 'basic.<zone>' volume type, got: {declared}"
                )));
            }
        }
    };
    let volume = find(quotas, &format!("volume_gigabytes_{volume_type}"))
        .ok_or_else(|| quota_error("unable to find volume quota"))?;

    let count = i64::from(opts.count);
    let required = [
        ("CPU", cpu, i64::from(opts.cpus.unwrap_or_default()) * count),
        ("RAM", ram, i64::from(opts.ram_mb.unwrap_or_default()) * count),
        ("volume", volume, i64::from(opts.volume_gb.unwrap_or_default()) * count),
    ];

    for (name, entries, needed) in required {
        let label = if name == "volume" {
            format!("{volume_type} volume")
        } else {
            name.to_string()
        };
        let mut checked = false;
        for entry in entries
            .iter()
            .filter(|e| e.zone.as_deref() == Some(opts.availability_zone.as_str()))
        {
            let free = entry.value - entry.used;
            if free < needed {
                return Err(quota_error(format!(
                    "not enough {label} quota to create nodes, free: {free}, required: {needed}"
                )));
            }
            checked = true;
        }
        if !checked {
            return Err(quota_error(format!(
                "unable to check {name} quota for a nodegroup"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn quota(name: &str, region: &str, zone: Option<&str>, value: i64, used: i64) -> Quota {
        Quota {
            resource_name: name.into(),
            resource_quotas: vec![ResourceQuotaEntity {
                region: Some(region.into()),
                zone: zone.map(str::to_string),
                value,
                used,
            }],
        }
    }

    fn opts(volume_type: Option<&str>) -> NodegroupCreateOpts {
        NodegroupCreateOpts {
            count: 3,
            availability_zone: "ru-3a".into(),
            flavor_id: None,
            cpus: Some(2),
            ram_mb: Some(4096),
            volume_gb: Some(20),
            volume_type: volume_type.map(str::to_string),
            local_volume: false,
            keypair_name: None,
            affinity_policy: None,
            labels: BTreeMap::new(),
            taints: vec![],
        }
    }

    fn compute(cores_free: i64) -> Vec<Quota> {
        vec![
            quota("compute_cores", "ru-3", Some("ru-3a"), cores_free, 0),
            quota("compute_ram", "ru-3", Some("ru-3a"), 65536, 0),
            quota("volume_gigabytes_fast", "ru-3", Some("ru-3a"), 500, 100),
        ]
    }

    #[test]
    fn test_cluster_quota() {
        let quotas = vec![
            quota("mks_cluster_regional", "ru-3", None, 2, 1),
            quota("mks_cluster_zonal", "ru-3", None, 1, 1),
        ];
        assert!(check_cluster(&quotas, "ru-3", false).is_ok());
        assert_eq!(
            check_cluster(&quotas, "ru-3", true).unwrap_err().to_string(),
            "not enough quota to create zonal k8s cluster"
        );
        assert!(
            check_cluster(&quotas, "ru-1", false)
                .unwrap_err()
                .to_string()
                .starts_with("unable to check")
        );
    }

    #[test]
    fn test_nodegroup_quota_ok() {
        assert!(check_nodegroup(&compute(6), &opts(Some("fast.ru-3a"))).is_ok());
    }

    #[test]
    fn test_nodegroup_cpu_shortage() {
        let err = check_nodegroup(&compute(4), &opts(Some("fast.ru-3a"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "not enough CPU quota to create nodes, free: 4, required: 6"
        );
    }

    #[test]
    fn test_nodegroup_volume_shortage() {
        let mut ng = opts(Some("fast.ru-3a"));
        ng.volume_gb = Some(200);
        let err = check_nodegroup(&compute(16), &ng).unwrap_err();
        assert_eq!(
            err.to_string(),
            "not enough fast volume quota to create nodes, free: 400, required: 600"
        );
    }

    #[test]
    fn test_nodegroup_unknown_volume_type() {
        let err = check_nodegroup(&compute(16), &opts(Some("ssd.ru-3a"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected 'fast.<zone>', 'universal.<zone>' or 'basic.<zone>' volume type, got: ssd.ru-3a"
        );
    }
}
