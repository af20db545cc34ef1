//! Permission groups and inheritance.

use std::collections::{BTreeSet, HashMap, HashSet};

use permgrid_core::{CacheVersion, Entity, GroupId, Versioned};
use serde::{Deserialize, Serialize};

use crate::backend::{self, Backend};
use crate::rule::Rule;
use crate::tree::NodeTree;

/// The manager's group cache. Parent links are [`GroupId`]s resolved through
/// this map, so a removed group can never dangle.
pub type GroupCache = HashMap<GroupId, Group>;

/// Discriminant of a metadata value, as persisted by backends.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Str,
    Int,
    Float,
    Bool,
}

/// A typed group metadata value (prefix, suffix, build flags, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl DataValue {
    pub fn kind(&self) -> DataKind {
        match self {
            DataValue::Str(_) => DataKind::Str,
            DataValue::Int(_) => DataKind::Int,
            DataValue::Float(_) => DataKind::Float,
            DataValue::Bool(_) => DataKind::Bool,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            DataValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            DataValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::Str(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::Str(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Int(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Float(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Bool(value)
    }
}

/// Permissions model for an individual group: its own permission tree, the
/// set of parent groups it inherits from, and a metadata map.
///
/// A group may be a real named group or a per-user pseudo-group; the
/// [`GroupId`] type field tells them apart. Metadata is conceptually
/// inherited only from the primary parent, and that walk is the caller's
/// job — a group never merges its parents' metadata into its own.
#[derive(Debug, Clone)]
pub struct Group {
    id: GroupId,
    tree: NodeTree,
    parents: HashSet<GroupId>,
    primary_parent: Option<GroupId>,
    data: HashMap<String, DataValue>,
    version: CacheVersion,
}

impl Group {
    pub fn new(id: GroupId) -> Self {
        let tree = NodeTree::root(id.clone());
        Self {
            id,
            tree,
            parents: HashSet::new(),
            primary_parent: None,
            data: HashMap::new(),
            version: CacheVersion::next(),
        }
    }

    pub fn group_id(&self) -> &GroupId {
        &self.id
    }

    /// The group's own permission tree.
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }

    /// Direct parents only; transitive inheritance goes through [`closure`].
    ///
    /// [`closure`]: Group::closure
    pub fn parents(&self) -> &HashSet<GroupId> {
        &self.parents
    }

    pub fn primary_parent(&self) -> Option<&GroupId> {
        self.primary_parent.as_ref()
    }

    fn touch(&mut self) {
        self.version = CacheVersion::next();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inheritance
    // ─────────────────────────────────────────────────────────────────────

    /// Inherits rules from another group.
    ///
    /// Returns `false` (no backend call) when already inherited.
    pub fn inherit(&mut self, parent: &GroupId, backend: &dyn Backend) -> bool {
        if self.parents.contains(parent) {
            return false;
        }

        self.parents.insert(parent.clone());
        self.touch();
        tracing::debug!(group = %self.id, parent = %parent, "group inherits parent");
        backend::log_failure(
            "add_inherited_group",
            backend.add_inherited_group(&self.id, parent),
        );
        true
    }

    /// Stops inheriting rules from another group.
    ///
    /// Returns `false` (no backend call) when not inherited. The primary
    /// parent slot is left alone; callers that want both severed use
    /// [`Group::sever`].
    pub fn uninherit(&mut self, parent: &GroupId, backend: &dyn Backend) -> bool {
        if !self.parents.remove(parent) {
            return false;
        }

        self.touch();
        tracing::debug!(group = %self.id, parent = %parent, "group uninherits parent");
        backend::log_failure(
            "remove_inherited_group",
            backend.remove_inherited_group(&self.id, parent),
        );
        true
    }

    /// Sets the group's primary parent, inheriting from it first if needed.
    ///
    /// `None` clears the primary parent without touching the parent set.
    /// Returns `false` when the primary parent is unchanged.
    pub fn set_primary_parent(&mut self, parent: Option<&GroupId>, backend: &dyn Backend) -> bool {
        if self.primary_parent.as_ref() == parent {
            return false;
        }

        if let Some(parent) = parent {
            if !self.parents.contains(parent) {
                self.inherit(parent, backend);
            }
        }

        self.primary_parent = parent.cloned();
        self.touch();
        backend::log_failure(
            "update_primary_parent",
            backend.update_primary_parent(&self.id, parent),
        );
        true
    }

    /// Removes every inheritance link to `target`: the parent-set entry and,
    /// if it matches, the primary-parent slot. Used when a group is destroyed.
    pub fn sever(&mut self, target: &GroupId, backend: &dyn Backend) -> bool {
        let mut changed = self.uninherit(target, backend);

        if self.primary_parent.as_ref() == Some(target) {
            self.primary_parent = None;
            self.touch();
            backend::log_failure(
                "update_primary_parent",
                backend.update_primary_parent(&self.id, None),
            );
            changed = true;
        }

        changed
    }

    /// Whether this group inherits from `target`, directly or transitively.
    ///
    /// Cycle-safe: a group reached through a cycle is checked once and never
    /// revisited.
    pub fn is_inherited(&self, target: &GroupId, groups: &GroupCache) -> bool {
        if self.parents.contains(target) {
            return true;
        }

        let mut visited: HashSet<&GroupId> = HashSet::new();
        visited.insert(&self.id);
        let mut frontier: Vec<&GroupId> = self.parents.iter().collect();

        while let Some(id) = frontier.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(group) = groups.get(id) {
                frontier.extend(&group.parents);
            }
        }

        false
    }

    /// This group plus every group it inherits from, direct or indirect.
    ///
    /// Traversal keeps a dedicated visited set, so each group in a cyclic or
    /// diamond-shaped graph is expanded exactly once. Parents missing from
    /// the cache are skipped.
    pub fn closure<'a>(&'a self, groups: &'a GroupCache) -> Vec<&'a Group> {
        let mut visited: HashSet<&GroupId> = HashSet::new();
        let mut members: Vec<&Group> = Vec::new();
        let mut frontier: Vec<&Group> = vec![self];

        while let Some(group) = frontier.pop() {
            if !visited.insert(&group.id) {
                continue;
            }
            members.push(group);

            for parent in &group.parents {
                if visited.contains(parent) {
                    continue;
                }
                if let Some(parent) = groups.get(parent) {
                    frontier.push(parent);
                }
            }
        }

        members
    }

    /// Canonical names of the closure, deterministically ordered.
    pub fn closure_names(&self, groups: &GroupCache) -> BTreeSet<String> {
        self.closure(groups)
            .iter()
            .map(|group| group.id.canonical_name())
            .collect()
    }

    /// Determines whether this group, with everything it inherits, permits
    /// or denies a permission.
    pub fn resolve(&self, permission: &str, groups: &GroupCache) -> Rule {
        let rules = self
            .closure(groups)
            .into_iter()
            .map(|group| group.tree.get_rule(permission));
        Rule::effective(rules)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────────

    /// Fetches a metadata value. Not inherited — callers wanting primary
    /// parent fallback walk [`Group::primary_parent`] themselves.
    pub fn data(&self, key: &str) -> Option<&DataValue> {
        self.data.get(key)
    }

    /// Stores a metadata value, last write wins.
    ///
    /// Returns `false` (no backend call) when the stored value is already
    /// equal.
    pub fn set_data(&mut self, key: &str, value: DataValue, backend: &dyn Backend) -> bool {
        if self.data.get(key) == Some(&value) {
            return false;
        }

        let replaced = self.data.insert(key.to_string(), value.clone()).is_some();
        self.touch();
        if replaced {
            backend::log_failure(
                "update_group_data",
                backend.update_group_data(&self.id, key, &value),
            );
        } else {
            backend::log_failure(
                "add_group_data",
                backend.add_group_data(&self.id, key, &value),
            );
        }
        true
    }

    /// Removes a metadata entry. Returns `false` when the key was absent.
    pub fn remove_data(&mut self, key: &str, backend: &dyn Backend) -> bool {
        if self.data.remove(key).is_none() {
            return false;
        }

        self.touch();
        backend::log_failure("remove_group_data", backend.remove_group_data(&self.id, key));
        true
    }
}

impl Entity for Group {
    type Id = GroupId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Versioned for Group {
    fn cache_version(&self) -> CacheVersion {
        self.version
    }
}

impl core::fmt::Display for Group {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.id.canonical_name())
    }
}
