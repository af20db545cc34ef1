//! Per-group permission tries.

use std::collections::HashMap;

use permgrid_core::{CacheVersion, GroupId, Versioned};

use crate::backend::{self, Backend};
use crate::node::{ALL_NAME, NodeInfo, Segment};
use crate::rule::{NodeEffect, Rule};

/// Maximum number of nodes in an absolute path. Longer paths are silently
/// truncated, not rejected.
pub const MAX_DEPTH: usize = 32;

/// A single permission node, offering child permission nodes.
///
/// Wildcard nodes (name `*`) are always leaves; every other node owns a map
/// of children keyed by segment name. Roots carry the reserved name `.` with
/// no opinion.
#[derive(Debug, Clone)]
pub struct NodeTree {
    info: NodeInfo,
    children: Option<HashMap<String, NodeTree>>,
    version: CacheVersion,
}

impl NodeTree {
    fn new(info: NodeInfo) -> Self {
        let children = if info.is_wildcard() {
            None
        } else {
            Some(HashMap::new())
        };

        Self {
            info,
            children,
            version: CacheVersion::next(),
        }
    }

    /// Creates an empty root, suitable for receiving child nodes.
    pub fn root(group: GroupId) -> Self {
        Self::new(NodeInfo::root(group))
    }

    /// Builds a tree from a batch of permission paths, e.g. loaded from
    /// storage or user input.
    pub fn from_paths<I, S>(group: GroupId, paths: I, backend: &dyn Backend) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = Self::root(group);
        for path in paths {
            root.add_path(path.as_ref(), backend);
        }
        root
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// Whether this node can hold children (everything but wildcard leaves).
    pub fn is_tree(&self) -> bool {
        self.children.is_some()
    }

    /// Whether this node has no children.
    pub fn is_empty(&self) -> bool {
        self.children
            .as_ref()
            .is_none_or(|children| children.is_empty())
    }

    /// Splits a permission path into raw segments: runs of `.` separate
    /// segments, empty segments are discarded, and at most [`MAX_DEPTH`]
    /// segments are kept.
    pub fn split_segments(permission: &str) -> Vec<&str> {
        permission
            .split('.')
            .filter(|segment| !segment.is_empty())
            .take(MAX_DEPTH)
            .collect()
    }

    /// Parses a path into nodes, each relative to the accumulated ancestor
    /// chain starting at this node.
    ///
    /// A deny marker or priority prefix on the FIRST segment governs the
    /// path's terminal node, so `-a.b.c` denies `a.b.c` rather than `a`. The
    /// terminal's own modifiers take precedence when both are present.
    fn split_info(&self, path: &str) -> Vec<NodeInfo> {
        let mut segments: Vec<Segment> = Self::split_segments(path)
            .into_iter()
            .map(Segment::scan)
            .collect();

        if segments.len() > 1 {
            let first = &mut segments[0];
            let deny = core::mem::replace(&mut first.deny, false);
            let priority = first.priority.take();

            if let Some(last) = segments.last_mut() {
                last.deny |= deny;
                if last.priority.is_none() {
                    last.priority = priority;
                }
            }
        }

        let mut ancestors = self.info.path();
        let mut nodes = Vec::with_capacity(segments.len());

        for segment in segments {
            let node =
                NodeInfo::from_segment(self.info.group().clone(), ancestors.clone(), segment);
            ancestors.push(node.clone());
            nodes.push(node);
        }

        nodes
    }

    /// Adds a path of nodes, creating descendants as necessary.
    ///
    /// Existing nodes absorb the new parse by merge; new nodes bump the
    /// parent's cache version and are reported to the backend. Descent stops
    /// at a wildcard leaf even if segments remain.
    pub fn add_path(&mut self, path: &str, backend: &dyn Backend) {
        let mut node = self;
        for info in node.split_info(path) {
            let Some(next) = node.ensure_node(info, backend) else {
                return;
            };
            node = next;
        }
    }

    /// Ensures a child exists for `info`, merging into an existing child or
    /// inserting a new one. Returns `None` when this node is a wildcard leaf.
    fn ensure_node(&mut self, info: NodeInfo, backend: &dyn Backend) -> Option<&mut NodeTree> {
        use std::collections::hash_map::Entry;

        let children = self.children.as_mut()?;
        match children.entry(info.name().to_string()) {
            Entry::Occupied(entry) => {
                let node = entry.into_mut();
                node.info.merge(&info);
                Some(node)
            }
            Entry::Vacant(entry) => {
                self.version = CacheVersion::next();
                backend::log_failure("create_node", backend.create_node(&info));
                Some(entry.insert(NodeTree::new(info)))
            }
        }
    }

    /// Removes the last node in a path, along with any children.
    ///
    /// Only the final segment's subtree is removed from its immediate parent;
    /// intermediate nodes created along the way stay. Returns `false` when
    /// the path does not exist.
    pub fn remove_path(&mut self, path: &str, backend: &dyn Backend) -> bool {
        let nodes = self.split_info(path);
        let Some((last, ancestors)) = nodes.split_last() else {
            return false;
        };

        let mut node = self;
        for info in ancestors {
            let Some(next) = node
                .children
                .as_mut()
                .and_then(|children| children.get_mut(info.name()))
            else {
                return false;
            };
            node = next;
        }

        node.remove_child(last.name(), backend)
    }

    fn remove_child(&mut self, name: &str, backend: &dyn Backend) -> bool {
        let Some(removed) = self
            .children
            .as_mut()
            .and_then(|children| children.remove(name))
        else {
            return false;
        };

        self.version = CacheVersion::next();
        backend::log_failure("remove_node", backend.remove_node(removed.info()));
        true
    }

    /// Updates the effect and priority of an existing node, bypassing merge
    /// precedence. A non-structural update: the node keeps its children.
    ///
    /// Returns `false` when the path does not exist or nothing changed.
    pub fn set_rule(
        &mut self,
        path: &str,
        effect: NodeEffect,
        priority: i64,
        backend: &dyn Backend,
    ) -> bool {
        let nodes = self.split_info(path);
        if nodes.is_empty() {
            return false;
        }

        let mut node = self;
        for info in &nodes {
            let Some(next) = node
                .children
                .as_mut()
                .and_then(|children| children.get_mut(info.name()))
            else {
                return false;
            };
            node = next;
        }

        if !node.info.set_rule(effect, priority) {
            return false;
        }

        node.version = CacheVersion::next();
        backend::log_failure("update_node", backend.update_node(&node.info));
        true
    }

    /// Determines whether this tree permits or denies a permission.
    ///
    /// At each level the exact-name child (followed to the end of the path)
    /// and a wildcard child (terminating wherever it appears) both count;
    /// the dominant candidate wins.
    pub fn get_rule(&self, permission: &str) -> Rule {
        let lowered = permission.to_lowercase();
        let segments = Self::split_segments(&lowered);
        self.rule_at(&segments, 0)
    }

    fn rule_at(&self, segments: &[&str], index: usize) -> Rule {
        if index >= segments.len() {
            return self.info.rule();
        }

        let Some(children) = self.children.as_ref() else {
            return Rule::NONE;
        };

        let mut candidates = Vec::with_capacity(2);
        if let Some(child) = children.get(segments[index]) {
            candidates.push(child.rule_at(segments, index + 1));
        }
        if let Some(wildcard) = children.get(ALL_NAME) {
            candidates.push(wildcard.info.rule());
        }

        Rule::effective(candidates)
    }
}

impl Versioned for NodeTree {
    fn cache_version(&self) -> CacheVersion {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use permgrid_core::GroupType;

    use crate::backend::NullBackend;

    use super::*;

    fn group() -> GroupId {
        GroupId::new("overworld", GroupType::Normal, "staff")
    }

    fn tree_with(paths: &[&str]) -> NodeTree {
        NodeTree::from_paths(group(), paths.iter().copied(), &NullBackend)
    }

    #[test]
    fn add_then_get_round_trips() {
        let tree = tree_with(&["a.b.c"]);
        assert_eq!(
            tree.get_rule("a.b.c"),
            Rule::new(NodeEffect::Allow, 1000)
        );
    }

    #[test]
    fn deny_re_add_merges_over_allow() {
        let mut tree = tree_with(&["a.b.c"]);
        tree.add_path("-a.b.c", &NullBackend);
        assert_eq!(tree.get_rule("a.b.c"), Rule::new(NodeEffect::Deny, 1100));
    }

    #[test]
    fn intermediate_nodes_have_no_opinion_on_longer_paths() {
        let tree = tree_with(&["a.b"]);
        assert_eq!(tree.get_rule("a.b"), Rule::new(NodeEffect::Allow, 1000));
        assert_eq!(tree.get_rule("a.b.c"), Rule::NONE);
        // "a" alone was created as an allow node on the way down.
        assert_eq!(tree.get_rule("a"), Rule::new(NodeEffect::Allow, 1000));
    }

    #[test]
    fn wildcard_covers_unmatched_siblings() {
        let tree = tree_with(&["a.*", "-a.b"]);
        assert_eq!(tree.get_rule("a.b"), Rule::new(NodeEffect::Deny, 1100));
        assert_eq!(tree.get_rule("a.c"), Rule::new(NodeEffect::Allow, 1000));
        assert_eq!(tree.get_rule("a.c.d"), Rule::new(NodeEffect::Allow, 1000));
    }

    #[test]
    fn deny_all_loses_to_specific_allow() {
        let tree = tree_with(&["-a.*", "a.b"]);
        assert_eq!(tree.get_rule("a.b"), Rule::new(NodeEffect::Allow, 1000));
        assert_eq!(tree.get_rule("a.z"), Rule::new(NodeEffect::Deny, 900));
    }

    #[test]
    fn leading_modifiers_govern_the_terminal_node() {
        let tree = tree_with(&["-a.b.c"]);
        assert_eq!(tree.get_rule("a.b.c"), Rule::new(NodeEffect::Deny, 1100));
        // Intermediate nodes are plain allows, not denies.
        assert_eq!(tree.get_rule("a"), Rule::new(NodeEffect::Allow, 1000));
        assert_eq!(tree.get_rule("a.b"), Rule::new(NodeEffect::Allow, 1000));

        // Hoisted modifiers combine with the terminal's own; an explicit
        // terminal priority is kept.
        let tree = tree_with(&["-a.50:b"]);
        assert_eq!(tree.get_rule("a.b"), Rule::new(NodeEffect::Deny, 50));
    }

    #[test]
    fn wildcard_is_a_leaf_and_truncates_deeper_adds() {
        let mut tree = tree_with(&["a.*"]);
        // The segments after the wildcard are dropped, not attached.
        tree.add_path("a.*.deeper", &NullBackend);
        assert_eq!(tree.get_rule("a.x.deeper"), Rule::new(NodeEffect::Allow, 1000));
    }

    #[test]
    fn remove_path_drops_subtree() {
        let mut tree = tree_with(&["a.b.c", "a.b.d"]);
        assert!(tree.remove_path("a.b", &NullBackend));
        assert_eq!(tree.get_rule("a.b"), Rule::NONE);
        assert_eq!(tree.get_rule("a.b.c"), Rule::NONE);
        assert_eq!(tree.get_rule("a.b.d"), Rule::NONE);
        // The ancestor created on the way in stays.
        assert_eq!(tree.get_rule("a"), Rule::new(NodeEffect::Allow, 1000));
    }

    #[test]
    fn remove_missing_path_is_a_no_op() {
        let mut tree = tree_with(&["a.b"]);
        assert!(!tree.remove_path("a.x", &NullBackend));
        assert!(!tree.remove_path("q", &NullBackend));
    }

    #[test]
    fn runs_of_dots_collapse() {
        let tree = tree_with(&["a..b"]);
        assert_eq!(tree.get_rule("a.b"), Rule::new(NodeEffect::Allow, 1000));
        assert_eq!(tree.get_rule(".a.b."), Rule::new(NodeEffect::Allow, 1000));
    }

    #[test]
    fn paths_deeper_than_max_depth_are_truncated() {
        let deep: Vec<String> = (0..MAX_DEPTH + 4).map(|i| format!("s{i}")).collect();
        let path = deep.join(".");
        let mut tree = NodeTree::root(group());
        tree.add_path(&path, &NullBackend);

        let kept = deep[..MAX_DEPTH].join(".");
        assert_eq!(tree.get_rule(&kept), Rule::new(NodeEffect::Allow, 1000));
    }

    #[test]
    fn queries_are_case_insensitive() {
        let tree = tree_with(&["Plugin.Feature"]);
        assert_eq!(
            tree.get_rule("PLUGIN.feature"),
            Rule::new(NodeEffect::Allow, 1000)
        );
    }

    #[test]
    fn explicit_priorities_govern_between_branches() {
        let tree = tree_with(&["1200:-a.b", "a.*"]);
        assert_eq!(tree.get_rule("a.b"), Rule::new(NodeEffect::Deny, 1200));
    }

    #[test]
    fn set_rule_updates_in_place() {
        let mut tree = tree_with(&["a.b"]);
        assert!(tree.set_rule("a.b", NodeEffect::Deny, 700, &NullBackend));
        assert_eq!(tree.get_rule("a.b"), Rule::new(NodeEffect::Deny, 700));
        // Unchanged values and missing paths report no change.
        assert!(!tree.set_rule("a.b", NodeEffect::Deny, 700, &NullBackend));
        assert!(!tree.set_rule("a.zzz", NodeEffect::Deny, 700, &NullBackend));
    }

    #[test]
    fn version_bumps_on_insert_and_remove_only() {
        let mut tree = NodeTree::root(group());
        let fresh = tree.cache_version();

        tree.add_path("a", &NullBackend);
        let after_add = tree.cache_version();
        assert_ne!(fresh, after_add);

        // Merging into an existing node does not bump the version.
        tree.add_path("-a", &NullBackend);
        assert_eq!(tree.cache_version(), after_add);

        tree.remove_path("a", &NullBackend);
        assert_ne!(tree.cache_version(), after_add);
    }
}
