//! Floating IP reconciliation for datastore instances
//!
//! The declared counts per role are compared with what the live instances
//! hold. The result is a list of attach and detach calls, attaches first,
//! validated as a whole before any call is made.

use crate::client::{Datastore, FloatingIps, Instance};
use crate::error::{DbaasError, Result};

pub const MASTER: &str = "MASTER";
pub const REPLICA: &str = "REPLICA";

/// One floating IP call against a datastore instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloatingIpStep {
    Attach { role: &'static str, instance_id: String },
    Detach { role: &'static str, instance_id: String },
}

fn error(message: String) -> DbaasError {
    DbaasError::FloatingIps(message)
}

fn replicas(datastore: &Datastore, with_floating_ip: bool) -> Vec<&Instance> {
    datastore
        .instances
        .iter()
        .filter(|i| i.role == REPLICA && i.floating_ip().is_some() == with_floating_ip)
        .collect()
}

/// Floating IPs currently attached, counted per role.
pub fn current_counts(datastore: &Datastore) -> Result<FloatingIps> {
    let mut counts = FloatingIps::default();
    for instance in datastore.instances.iter().filter(|i| i.floating_ip().is_some()) {
        match instance.role.as_str() {
            MASTER => {
                counts.master += 1;
                if counts.master > 1 {
                    return Err(error(format!(
                        "more than one {MASTER} with a floating IP found in the datastore"
                    )));
                }
            }
            REPLICA => counts.replica += 1,
            _ => {}
        }
    }
    Ok(counts)
}

/// Calls needed to bring the datastore to the `desired` counts.
pub fn plan_floating_ips(datastore: &Datastore, desired: &FloatingIps) -> Result<Vec<FloatingIpStep>> {
    let current = current_counts(datastore)?;
    let master_diff = desired.master - current.master;
    let replica_diff = desired.replica - current.replica;

    let master = datastore
        .instances
        .iter()
        .find(|i| i.role == MASTER)
        .ok_or_else(|| error(format!("{MASTER} instance not found in the datastore")))?;

    let master_total = i32::from(master.floating_ip().is_some()) + master_diff;
    if master_total.abs() > 1 {
        return Err(error(format!(
            "floating IPs count for {MASTER} could not be greater than 1"
        )));
    }
    if master_total < 0 {
        return Err(error(format!(
            "floating IPs count for {MASTER} could not be less than 0"
        )));
    }
    if desired.replica < 0 {
        return Err(error(format!(
            "floating IPs count for {REPLICA} could not be less than 0"
        )));
    }

    let mut attaches = Vec::new();
    let mut detaches = Vec::new();

    if replica_diff > 0 {
        let free = replicas(datastore, false);
        let needed = replica_diff as usize;
        if free.len() < needed {
            return Err(error(format!(
                "insufficient replicas without floating IPs: needed {needed}, found {}",
                free.len()
            )));
        }
        attaches.extend(free.iter().take(needed).map(|i| FloatingIpStep::Attach {
            role: REPLICA,
            instance_id: i.id.clone(),
        }));
    }
    if replica_diff < 0 {
        let holding = replicas(datastore, true);
        let needed = replica_diff.unsigned_abs() as usize;
        if holding.len() < needed {
            return Err(error(format!(
                "insufficient replicas with floating IPs: needed {needed}, found {}",
                holding.len()
            )));
        }
        detaches.extend(holding.iter().take(needed).map(|i| FloatingIpStep::Detach {
            role: REPLICA,
            instance_id: i.id.clone(),
        }));
    }

    if master_diff > 0 {
        attaches.push(FloatingIpStep::Attach {
            role: MASTER,
            instance_id: master.id.clone(),
        });
    }
    if master_diff < 0 {
        detaches.push(FloatingIpStep::Detach {
            role: MASTER,
            instance_id: master.id.clone(),
        });
    }

    attaches.extend(detaches);
    Ok(attaches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Datastore with a master and `replicas` replicas; the first
    /// `replica_ips` replicas hold a floating IP.
    fn datastore(master_ip: bool, replicas: usize, replica_ips: usize) -> Datastore {
        let master_floating_ip = if master_ip { "203.0.113.1" } else { "" };
        let mut instances = vec![json!({
            "id": "master", "role": "MASTER", "floating_ip": master_floating_ip
        })];
        for n in 0..replicas {
            let floating_ip = (n < replica_ips).then_some("203.0.113.9");
            instances.push(json!({
                "id": format!("replica-{n}"), "role": "REPLICA", "floating_ip": floating_ip
            }));
        }
        serde_json::from_value(json!({"id": "ds-1", "status": "ACTIVE", "instances": instances}))
            .unwrap()
    }

    #[test]
    fn test_current_counts() {
        let counts = current_counts(&datastore(true, 3, 2)).unwrap();
        assert_eq!(counts, FloatingIps { master: 1, replica: 2 });
    }

    #[test]
    fn test_single_replica_detach() {
        let steps = plan_floating_ips(&datastore(true, 2, 2), &FloatingIps { master: 1, replica: 1 }).unwrap();
        assert_eq!(
            steps,
            [FloatingIpStep::Detach {
                role: REPLICA,
                instance_id: "replica-0".into()
            }]
        );
    }

    #[test]
    fn test_two_master_ips_rejected() {
        let err = plan_floating_ips(&datastore(false, 1, 0), &FloatingIps { master: 2, replica: 0 }).unwrap_err();
        assert_eq!(
            err.to_string(),
            "floating IPs count for MASTER could not be greater than 1"
        );
    }

    #[test]
    fn test_negative_master_rejected() {
        let err = plan_floating_ips(&datastore(false, 1, 0), &FloatingIps { master: -1, replica: 0 }).unwrap_err();
        assert_eq!(
            err.to_string(),
            "floating IPs count for MASTER could not be less than 0"
        );
    }

    #[test]
    fn test_not_enough_replicas() {
        let err = plan_floating_ips(&datastore(false, 2, 1), &FloatingIps { master: 0, replica: 3 }).unwrap_err();
        assert_eq!(
            err.to_string(),
            "insufficient replicas without floating IPs: needed 2, found 1"
        );
    }

    #[test]
    fn test_attaches_before_detaches() {
        let steps = plan_floating_ips(&datastore(true, 2, 0), &FloatingIps { master: 0, replica: 2 }).unwrap();
        let kinds: Vec<_> = steps
            .iter()
            .map(|s| match s {
                FloatingIpStep::Attach { role, .. } => ("attach", *role),
                FloatingIpStep::Detach { role, .. } => ("detach", *role),
            })
            .collect();
        assert_eq!(
            kinds,
            [("attach", REPLICA), ("attach", REPLICA), ("detach", MASTER)]
        );
    }

    #[test]
    fn test_unchanged_counts_need_no_calls() {
        let steps = plan_floating_ips(&datastore(true, 1, 1), &FloatingIps { master: 1, replica: 1 }).unwrap();
        assert!(steps.is_empty());
    }
}
