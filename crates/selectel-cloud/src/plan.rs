//! Reconciliation plans for nested collections
//!
//! Keyed nested collections, such as nodegroups declared by name, are
//! reconciled by diffing the old and new declared sets into a [`Plan`].
//! Plans always run creates first, then updates, then deletes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Planned change for one element of a nested collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action<T> {
    /// Type of action to perform
    pub action_type: ActionType,

    /// Key of the element within its collection
    pub key: String,

    /// Declared element this action applies
    pub item: T,
}

impl<T> Action<T> {
    pub fn new(action_type: ActionType, key: impl Into<String>, item: T) -> Self {
        Self {
            action_type,
            key: key.into(),
            item,
        }
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new element
    Create,
    /// Update an existing element in place
    Update,
    /// Delete an element
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Ordered list of actions to apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan<T> {
    pub actions: Vec<Action<T>>,
    pub has_changes: bool,
}

impl<T> Plan<T> {
    /// Build a plan, ordering creates before updates before deletes.
    ///
    /// The sort is stable, so actions of the same type keep their input order.
    pub fn new(mut actions: Vec<Action<T>>) -> Self {
        actions.sort_by_key(|a| a.action_type);
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action<T>> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

/// Two elements of one collection share a key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("duplicate key '{0}'")]
pub struct DuplicateKey(pub String);

/// First key that appears more than once, in input order.
pub fn find_duplicate_key<T, F>(items: &[T], key: F) -> Option<String>
where
    F: Fn(&T) -> String,
{
    let mut seen = BTreeSet::new();
    items.iter().map(key).find(|k| !seen.insert(k.clone()))
}

/// Split two keyed collections into additions, removals and common pairs.
///
/// Keys must be unique within each side; a repeated key would hide an
/// element from the diff.
pub struct KeyedDiff<'a, T> {
    /// In new, not in old
    pub added: Vec<&'a T>,
    /// In old, not in new
    pub removed: Vec<&'a T>,
    /// In both, as `(old, new)`
    pub common: Vec<(&'a T, &'a T)>,
}

impl<'a, T> KeyedDiff<'a, T> {
    pub fn new<F>(old: &'a [T], new: &'a [T], key: F) -> Result<Self, DuplicateKey>
    where
        F: Fn(&T) -> String,
    {
        if let Some(dup) = find_duplicate_key(old, &key).or_else(|| find_duplicate_key(new, &key)) {
            return Err(DuplicateKey(dup));
        }

        let old_by_key: BTreeMap<String, &T> = old.iter().map(|o| (key(o), o)).collect();
        let new_by_key: BTreeMap<String, &T> = new.iter().map(|n| (key(n), n)).collect();

        let mut added = Vec::new();
        let mut common = Vec::new();
        for item in new {
            match old_by_key.get(&key(item)) {
                Some(previous) => common.push((*previous, item)),
                None => added.push(item),
            }
        }
        let removed = old
            .iter()
            .filter(|o| !new_by_key.contains_key(&key(o)))
            .collect();

        Ok(Self {
            added,
            removed,
            common,
        })
    }
}
