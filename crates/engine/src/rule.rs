//! Rules and the dominance ordering that reduces them.

use serde::{Deserialize, Serialize};

/// The opinion a permission node expresses.
///
/// The variant order matters: it is the tie-break applied between rules of
/// equal priority, so `Deny` wins ties over `Allow`. The order carries no
/// meaning on its own — dominance between rules goes through [`Rule`].
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeEffect {
    /// No opinion.
    #[default]
    None,
    /// Allow the permission.
    Allow,
    /// Deny the permission.
    Deny,
}

impl core::fmt::Display for NodeEffect {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NodeEffect::None => f.write_str("none"),
            NodeEffect::Allow => f.write_str("allow"),
            NodeEffect::Deny => f.write_str("deny"),
        }
    }
}

/// The result of applying a permission tree to a single permission.
///
/// A rule is meaningful only relative to other rules, via the dominance
/// ordering; it carries no path information.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    pub effect: NodeEffect,
    pub priority: i64,
}

impl Rule {
    /// An ineffective rule: dominated by every other rule, dominates nothing.
    pub const NONE: Rule = Rule {
        effect: NodeEffect::None,
        priority: 0,
    };

    pub fn new(effect: NodeEffect, priority: i64) -> Self {
        Self { effect, priority }
    }

    /// Whether the rule's answer is an allow.
    pub fn allows(&self) -> bool {
        self.effect == NodeEffect::Allow
    }

    /// Determines the effective rule from a set of candidate rules.
    ///
    /// Returns [`Rule::NONE`] for an empty input; otherwise the dominant rule
    /// under the ordering below. The result is independent of input order.
    pub fn effective<I>(rules: I) -> Rule
    where
        I: IntoIterator<Item = Rule>,
    {
        rules.into_iter().max().unwrap_or(Rule::NONE)
    }
}

impl Ord for Rule {
    /// Dominance ordering: identical rules are equal; [`Rule::NONE`] loses to
    /// every other rule; then higher priority wins; at equal priority the
    /// effect order decides (deny beats allow).
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        use core::cmp::Ordering;

        if self == other {
            return Ordering::Equal;
        }
        if *self == Rule::NONE {
            return Ordering::Less;
        }
        if *other == Rule::NONE {
            return Ordering::Greater;
        }

        self.priority
            .cmp(&other.priority)
            .then_with(|| self.effect.cmp(&other.effect))
    }
}

impl PartialOrd for Rule {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl core::fmt::Display for Rule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.effect, self.priority)
    }
}
