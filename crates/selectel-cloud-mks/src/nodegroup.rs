//! Nodegroups nested in a cluster
//!
//! Nodegroups are declared by name; the API only knows their ids. Changes
//! between two declarations become a [`Plan`]: new names are created, names
//! whose only change is `count` are resized, and dropped names are deleted.

use crate::client::{Node, Nodegroup, NodegroupCreateOpts, Taint};
use crate::error::{MksError, Result};
use selectel_cloud::{Action, ActionType, DuplicateKey, KeyedDiff, Plan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared nodegroup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodegroupSpec {
    pub name: String,
    pub availability_zone: String,
    pub count: u32,
    #[serde(default)]
    pub keypair_name: Option<String>,
    #[serde(default)]
    pub affinity_policy: Option<String>,
    #[serde(default)]
    pub cpus: Option<u32>,
    #[serde(default)]
    pub ram_mb: Option<u32>,
    #[serde(default)]
    pub volume_gb: Option<u32>,
    #[serde(default)]
    pub volume_type: Option<String>,
    #[serde(default)]
    pub local_volume: bool,
    #[serde(default)]
    pub flavor_id: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
    /// Assigned by the API after creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl NodegroupSpec {
    pub fn create_opts(&self) -> NodegroupCreateOpts {
        NodegroupCreateOpts {
            count: self.count,
            availability_zone: self.availability_zone.clone(),
            flavor_id: self.flavor_id.clone(),
            cpus: self.cpus,
            ram_mb: self.ram_mb,
            volume_gb: self.volume_gb,
            volume_type: self.volume_type.clone(),
            local_volume: self.local_volume,
            keypair_name: self.keypair_name.clone(),
            affinity_policy: self.affinity_policy.clone(),
            labels: self.labels.clone(),
            taints: self.taints.clone(),
        }
    }

    /// First field other than `count` and `id` that differs.
    fn changed_field(&self, other: &NodegroupSpec) -> Option<&'static str> {
        let checks: [(&'static str, bool); 11] = [
            ("availability_zone", self.availability_zone != other.availability_zone),
            ("keypair_name", self.keypair_name != other.keypair_name),
            ("affinity_policy", self.affinity_policy != other.affinity_policy),
            ("cpus", self.cpus != other.cpus),
            ("ram_mb", self.ram_mb != other.ram_mb),
            ("volume_gb", self.volume_gb != other.volume_gb),
            ("volume_type", self.volume_type != other.volume_type),
            ("local_volume", self.local_volume != other.local_volume),
            ("flavor_id", self.flavor_id != other.flavor_id),
            ("labels", self.labels != other.labels),
            ("taints", self.taints != other.taints),
        ];
        checks
            .into_iter()
            .find_map(|(field, changed)| changed.then_some(field))
    }
}

/// Observed nodegroup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodegroupState {
    pub id: String,
    pub name: String,
    pub availability_zone: String,
    pub count: u32,
    pub flavor_id: String,
    pub volume_gb: u32,
    pub volume_type: String,
    pub local_volume: bool,
    pub affinity_policy: String,
    pub labels: BTreeMap<String, String>,
    pub taints: Vec<Taint>,
    pub nodes: Vec<Node>,
}

impl NodegroupState {
    /// Observed nodegroup named after its declaration; the id stands in for
    /// the name when nothing declares it.
    pub fn from_api(nodegroup: Nodegroup, declared: &[NodegroupSpec]) -> Self {
        let name = declared
            .iter()
            .find(|spec| spec.id.as_deref() == Some(nodegroup.id.as_str()))
            .map_or_else(|| nodegroup.id.clone(), |spec| spec.name.clone());
        Self {
            name,
            count: nodegroup.nodes.len() as u32,
            id: nodegroup.id,
            availability_zone: nodegroup.availability_zone,
            flavor_id: nodegroup.flavor_id,
            volume_gb: nodegroup.volume_gb,
            volume_type: nodegroup.volume_type,
            local_volume: nodegroup.local_volume,
            affinity_policy: nodegroup.affinity_policy,
            labels: nodegroup.labels,
            taints: nodegroup.taints,
            nodes: nodegroup.nodes,
        }
    }
}

/// Split a `<cluster_id>/<nodegroup_id>` identifier.
pub fn parse_id(id: &str) -> Result<(String, String)> {
    match id.split('/').collect::<Vec<_>>().as_slice() {
        [cluster, nodegroup] if !cluster.is_empty() && !nodegroup.is_empty() => {
            Ok((cluster.to_string(), nodegroup.to_string()))
        }
        _ => Err(MksError::InvalidNodegroupId(id.to_string())),
    }
}

/// Reconcile two nodegroup declarations.
///
/// Create actions carry the new declaration, update actions carry the new
/// declaration with the old id, and delete actions carry the old declaration.
/// Duplicate names, any difference other than `count` on a kept name, and
/// resizes or removals of nodegroups without a known id are rejected before
/// any API call is made.
pub fn plan_nodegroups(old: &[NodegroupSpec], new: &[NodegroupSpec]) -> Result<Plan<NodegroupSpec>> {
    let diff = KeyedDiff::new(old, new, |ng| ng.name.clone())
        .map_err(|DuplicateKey(name)| MksError::DuplicateNodegroup(name))?;
    let mut actions = Vec::new();

    for added in diff.added {
        actions.push(Action::new(ActionType::Create, &added.name, added.clone()));
    }

    for (previous, next) in diff.common {
        if let Some(field) = previous.changed_field(next) {
            return Err(MksError::NodegroupChanged {
                name: next.name.clone(),
                field,
            });
        }
        let item = NodegroupSpec {
            id: next.id.clone().or_else(|| previous.id.clone()),
            ..next.clone()
        };
        let action_type = if previous.count == next.count {
            ActionType::NoOp
        } else if item.id.is_none() {
            return Err(MksError::MissingNodegroupId(next.name.clone()));
        } else {
            ActionType::Update
        };
        actions.push(Action::new(action_type, &next.name, item));
    }

    for removed in diff.removed {
        if removed.id.is_none() {
            return Err(MksError::MissingNodegroupId(removed.name.clone()));
        }
        actions.push(Action::new(ActionType::Delete, &removed.name, removed.clone()));
    }

    Ok(Plan::new(actions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TaintEffect;

    fn nodegroup(name: &str, count: u32, id: Option<&str>) -> NodegroupSpec {
        NodegroupSpec {
            name: name.into(),
            availability_zone: "ru-3a".into(),
            count,
            keypair_name: None,
            affinity_policy: None,
            cpus: Some(2),
            ram_mb: Some(4096),
            volume_gb: Some(20),
            volume_type: Some("fast.ru-3a".into()),
            local_volume: false,
            flavor_id: None,
            labels: BTreeMap::new(),
            taints: vec![],
            id: id.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(
            parse_id("c-1/ng-1").unwrap(),
            ("c-1".to_string(), "ng-1".to_string())
        );
        for bad in ["c-1", "c-1/", "/ng-1", "a/b/c", ""] {
            assert!(matches!(parse_id(bad), Err(MksError::InvalidNodegroupId(_))), "{bad}");
        }
    }

    #[test]
    fn test_plan_adds_before_removes() {
        let old = vec![nodegroup("a", 1, Some("ng-a")), nodegroup("b", 1, Some("ng-b"))];
        let new = vec![nodegroup("b", 1, None), nodegroup("c", 2, None)];

        let plan = plan_nodegroups(&old, &new).unwrap();
        let steps: Vec<_> = plan
            .actions
            .iter()
            .map(|a| (a.action_type, a.key.as_str()))
            .collect();
        assert_eq!(
            steps,
            [
                (ActionType::Create, "c"),
                (ActionType::Delete, "a"),
                (ActionType::NoOp, "b"),
            ]
        );
        assert_eq!(plan.actions[1].item.id.as_deref(), Some("ng-a"));
    }

    #[test]
    fn test_count_change_is_resize_with_old_id() {
        let old = vec![nodegroup("workers", 2, Some("ng-1"))];
        let new = vec![nodegroup("workers", 5, None)];

        let plan = plan_nodegroups(&old, &new).unwrap();
        let updates = plan.actions_by_type(ActionType::Update);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].item.count, 5);
        assert_eq!(updates[0].item.id.as_deref(), Some("ng-1"));
    }

    #[test]
    fn test_other_change_is_rejected() {
        let old = vec![nodegroup("workers", 2, Some("ng-1"))];
        let mut changed = nodegroup("workers", 3, None);
        changed.taints.push(Taint {
            key: "dedicated".into(),
            value: "db".into(),
            effect: TaintEffect::NoSchedule,
        });

        let err = plan_nodegroups(&old, &[changed]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "nodegroup 'workers' can only be resized in place, but 'taints' changed"
        );
    }

    #[test]
    fn test_duplicate_old_name_rejected() {
        let old = vec![nodegroup("a", 1, Some("ng-1")), nodegroup("a", 1, Some("ng-2"))];
        let new = vec![nodegroup("a", 1, None)];

        let err = plan_nodegroups(&old, &new).unwrap_err();
        assert!(matches!(err, MksError::DuplicateNodegroup(ref name) if name == "a"));
        assert_eq!(err.to_string(), "nodegroup name 'a' is declared more than once");
    }

    #[test]
    fn test_duplicate_new_name_rejected() {
        let new = vec![nodegroup("a", 1, None), nodegroup("b", 1, None), nodegroup("a", 2, None)];
        let err = plan_nodegroups(&[], &new).unwrap_err();
        assert!(matches!(err, MksError::DuplicateNodegroup(ref name) if name == "a"));
    }

    #[test]
    fn test_removal_without_id_rejected() {
        let old = vec![nodegroup("a", 1, Some("ng-a")), nodegroup("b", 1, None)];
        let new = vec![nodegroup("a", 1, None)];
        let err = plan_nodegroups(&old, &new).unwrap_err();
        assert!(matches!(err, MksError::MissingNodegroupId(ref name) if name == "b"));
    }

    #[test]
    fn test_resize_without_id_rejected() {
        let old = vec![nodegroup("a", 1, None)];
        let new = vec![nodegroup("a", 2, None)];
        let err = plan_nodegroups(&old, &new).unwrap_err();
        assert!(matches!(err, MksError::MissingNodegroupId(ref name) if name == "a"));

        // Nothing to change, so a missing id does not matter
        assert!(!plan_nodegroups(&old, &old).unwrap().has_changes);
    }

    #[test]
    fn test_unchanged_declaration_has_no_changes() {
        let ngs = vec![nodegroup("a", 1, Some("ng-a"))];
        assert!(!plan_nodegroups(&ngs, &ngs).unwrap().has_changes);
    }

    #[test]
    fn test_state_takes_declared_name() {
        let api = Nodegroup {
            id: "ng-1".into(),
            flavor_id: "f".into(),
            volume_gb: 20,
            volume_type: "fast.ru-3a".into(),
            local_volume: false,
            availability_zone: "ru-3a".into(),
            nodes: vec![
                Node {
                    id: "n-1".into(),
                    hostname: "h1".into(),
                    ip: "10.0.0.1".into(),
                },
                Node {
                    id: "n-2".into(),
                    hostname: "h2".into(),
                    ip: "10.0.0.2".into(),
                },
            ],
            labels: BTreeMap::new(),
            taints: vec![],
            affinity_policy: String::new(),
        };

        let named = NodegroupState::from_api(api.clone(), &[nodegroup("workers", 2, Some("ng-1"))]);
        assert_eq!(named.name, "workers");
        assert_eq!(named.count, 2);

        let imported = NodegroupState::from_api(api, &[]);
        assert_eq!(imported.name, "ng-1");
    }
}
