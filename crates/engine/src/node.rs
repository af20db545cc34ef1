//! Parsed path-segment nodes.

use permgrid_core::GroupId;
use serde::{Deserialize, Serialize};

use crate::rule::{NodeEffect, Rule};

/// A node with this name represents all descendant nodes of its parent.
pub const ALL_NAME: &str = "*";

/// A node with this name is the root node of a tree.
pub const ROOT_NAME: &str = ".";

/// Prefixes a node name to mark it as a deny.
pub const EXCLUDE_PREFIX: char = '-';

/// A scanned path segment: bare name plus any modifiers found in the text.
///
/// Scanning is separate from [`NodeInfo`] construction so that tree-level
/// path assembly can hoist a leading segment's modifiers onto the terminal
/// node (a `-` or priority prefix at the start of a path governs the whole
/// path, not its first segment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub(crate) name: String,
    pub(crate) deny: bool,
    pub(crate) priority: Option<i64>,
}

impl Segment {
    /// Scans raw segment text.
    ///
    /// Grammar: an optional `<integer>:` priority prefix (split on the first
    /// run of colons), then an optional `-` deny marker, then the name. A
    /// non-numeric priority prefix is not an error: the whole lower-cased
    /// text becomes the name and the default priority applies.
    pub(crate) fn scan(text: &str) -> Self {
        let lowered = text.to_lowercase();

        let mut priority = None;
        let mut working = lowered.as_str();
        if let Some(colon) = lowered.find(':') {
            match lowered[..colon].parse::<i64>() {
                Ok(parsed) => {
                    priority = Some(parsed);
                    working = lowered[colon..].trim_start_matches(':');
                }
                Err(_) => {
                    working = lowered.as_str();
                }
            }
        }

        let (deny, name) = match working.strip_prefix(EXCLUDE_PREFIX) {
            Some(stripped) => (true, stripped),
            None => (false, working),
        };

        Self {
            name: name.to_string(),
            deny,
            priority,
        }
    }
}

/// One-dimensional information about a node: one segment of a permission
/// path, with its effect, priority, ancestry and owning group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    name: String,
    effect: NodeEffect,
    priority: i64,
    ancestors: Vec<NodeInfo>,
    group: GroupId,
}

impl NodeInfo {
    /// Parses raw segment text into a node (see [`Segment::scan`] for the
    /// grammar).
    ///
    /// `ancestors` is the exact parent chain from the owning tree's root,
    /// exclusive of the node itself.
    pub fn parse(group: GroupId, ancestors: Vec<NodeInfo>, text: &str) -> Self {
        Self::from_segment(group, ancestors, Segment::scan(text))
    }

    /// Builds a node from a scanned segment.
    pub(crate) fn from_segment(group: GroupId, ancestors: Vec<NodeInfo>, segment: Segment) -> Self {
        let effect = if segment.deny {
            NodeEffect::Deny
        } else {
            NodeEffect::Allow
        };
        let priority = segment
            .priority
            .unwrap_or_else(|| default_priority(&segment.name, effect));

        Self {
            name: segment.name,
            effect,
            priority,
            ancestors,
            group,
        }
    }

    /// The root node of a tree: reserved name `.`, no opinion, priority 0.
    pub fn root(group: GroupId) -> Self {
        Self {
            name: ROOT_NAME.to_string(),
            effect: NodeEffect::None,
            priority: 0,
            ancestors: Vec::new(),
            group,
        }
    }

    /// Identifying name of the node. Always lower-case.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn effect(&self) -> NodeEffect {
        self.effect
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Parent chain from the owning tree's root, exclusive of this node.
    pub fn ancestors(&self) -> &[NodeInfo] {
        &self.ancestors
    }

    /// The owning group.
    pub fn group(&self) -> &GroupId {
        &self.group
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_NAME
    }

    /// Whether this node covers all descendants of its parent.
    pub fn is_wildcard(&self) -> bool {
        self.name == ALL_NAME
    }

    /// Path to this node, inclusive: ancestors plus the node itself.
    pub fn path(&self) -> Vec<NodeInfo> {
        let mut path = self.ancestors.clone();
        path.push(self.clone());
        path
    }

    /// Dotted permission path from the root to this node (root excluded).
    pub fn path_string(&self) -> String {
        let mut names: Vec<&str> = self
            .ancestors
            .iter()
            .filter(|node| !node.is_root())
            .map(NodeInfo::name)
            .collect();
        names.push(&self.name);
        names.join(".")
    }

    /// Merges another parse of the same segment into this node, in place.
    ///
    /// The existing node wins on higher priority. At equal priority the
    /// DEFAULT priorities of the two parses break the tie — the kind of rule
    /// decides, even when both priorities were explicit. Otherwise the other
    /// node's priority and effect are adopted.
    pub fn merge(&mut self, other: &NodeInfo) {
        if self.priority > other.priority {
            return;
        }

        if self.priority == other.priority
            && default_priority(&self.name, self.effect)
                >= default_priority(&other.name, other.effect)
        {
            return;
        }

        self.priority = other.priority;
        self.effect = other.effect;
    }

    /// Adopts an explicit effect and priority, bypassing merge precedence.
    ///
    /// Returns `false` when nothing changed.
    pub(crate) fn set_rule(&mut self, effect: NodeEffect, priority: i64) -> bool {
        if self.effect == effect && self.priority == priority {
            return false;
        }
        self.effect = effect;
        self.priority = priority;
        true
    }

    /// The rule this node contributes, or [`Rule::NONE`] if it has no opinion.
    pub fn rule(&self) -> Rule {
        if self.effect == NodeEffect::None {
            return Rule::NONE;
        }
        Rule::new(self.effect, self.priority)
    }
}

impl core::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Default priority for a parsed name and effect.
///
/// An explicit non-wildcard deny outranks a plain allow; a wildcard deny is
/// weaker than a plain allow so that specific allows can override a blanket
/// deny-all.
pub(crate) fn default_priority(name: &str, effect: NodeEffect) -> i64 {
    if name == ROOT_NAME {
        return 0;
    }

    match effect {
        NodeEffect::Allow => 1000,
        NodeEffect::Deny => {
            if name == ALL_NAME {
                900
            } else {
                1100
            }
        }
        NodeEffect::None => 0,
    }
}

#[cfg(test)]
mod tests {
    use permgrid_core::GroupType;

    use super::*;

    fn group() -> GroupId {
        GroupId::new("overworld", GroupType::Normal, "staff")
    }

    fn parse(text: &str) -> NodeInfo {
        NodeInfo::parse(group(), Vec::new(), text)
    }

    #[test]
    fn plain_allow_gets_default_priority() {
        let node = parse("feature");
        assert_eq!(node.name(), "feature");
        assert_eq!(node.effect(), NodeEffect::Allow);
        assert_eq!(node.priority(), 1000);
    }

    #[test]
    fn deny_prefix_strips_and_outranks_allow() {
        let node = parse("-feature");
        assert_eq!(node.name(), "feature");
        assert_eq!(node.effect(), NodeEffect::Deny);
        assert_eq!(node.priority(), 1100);
    }

    #[test]
    fn wildcard_allow_and_deny_defaults() {
        let allow = parse("*");
        assert_eq!(allow.name(), "*");
        assert_eq!(allow.effect(), NodeEffect::Allow);
        assert_eq!(allow.priority(), 1000);

        let deny = parse("-*");
        assert_eq!(deny.name(), "*");
        assert_eq!(deny.effect(), NodeEffect::Deny);
        assert_eq!(deny.priority(), 900);
    }

    #[test]
    fn explicit_priority_prefix() {
        let node = parse("50:-feature");
        assert_eq!(node.name(), "feature");
        assert_eq!(node.effect(), NodeEffect::Deny);
        assert_eq!(node.priority(), 50);
    }

    #[test]
    fn run_of_colons_is_one_separator() {
        let node = parse("7::feature");
        assert_eq!(node.name(), "feature");
        assert_eq!(node.priority(), 7);
    }

    #[test]
    fn negative_explicit_priority() {
        let node = parse("-5:feature");
        assert_eq!(node.name(), "feature");
        assert_eq!(node.effect(), NodeEffect::Allow);
        assert_eq!(node.priority(), -5);
    }

    #[test]
    fn malformed_priority_prefix_keeps_whole_text_as_name() {
        let node = parse("abc:feature");
        assert_eq!(node.name(), "abc:feature");
        assert_eq!(node.effect(), NodeEffect::Allow);
        assert_eq!(node.priority(), 1000);
    }

    #[test]
    fn text_is_lowercased() {
        let node = parse("FEATURE");
        assert_eq!(node.name(), "feature");
    }

    #[test]
    fn merge_higher_existing_priority_wins() {
        let mut node = parse("100:feature");
        node.merge(&parse("50:-feature"));
        assert_eq!(node.effect(), NodeEffect::Allow);
        assert_eq!(node.priority(), 100);
    }

    #[test]
    fn merge_adopts_higher_incoming_priority() {
        let mut node = parse("feature");
        node.merge(&parse("-feature"));
        assert_eq!(node.effect(), NodeEffect::Deny);
        assert_eq!(node.priority(), 1100);
    }

    #[test]
    fn merge_tie_breaks_on_default_priority() {
        // Equal explicit priorities: the deny parse has the higher default
        // priority (1100 vs 1000), so it wins the tie.
        let mut node = parse("500:feature");
        node.merge(&parse("500:-feature"));
        assert_eq!(node.effect(), NodeEffect::Deny);
        assert_eq!(node.priority(), 500);

        // And the reverse direction keeps the existing deny.
        let mut node = parse("500:-feature");
        node.merge(&parse("500:feature"));
        assert_eq!(node.effect(), NodeEffect::Deny);
    }

    #[test]
    fn rule_of_root_is_none() {
        let root = NodeInfo::root(group());
        assert_eq!(root.rule(), Rule::NONE);
    }

    #[test]
    fn path_includes_self() {
        let parent = parse("a");
        let child = NodeInfo::parse(group(), vec![parent.clone()], "b");
        let path = child.path();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].name(), "a");
        assert_eq!(path[1].name(), "b");
        assert_eq!(child.path_string(), "a.b");
    }
}
