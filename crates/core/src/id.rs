//! Strongly-typed group identifiers.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PermError;

/// Kind of a permissions group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupType {
    /// A named group shared by many subjects.
    Normal,
    /// A pseudo-group holding a single user's own permissions.
    User,
}

impl GroupType {
    /// Single-character code used in canonical identifiers.
    pub fn code(&self) -> &'static str {
        match self {
            GroupType::Normal => "G",
            GroupType::User => "U",
        }
    }

    /// Parses a type code, falling back to `default` on anything unknown.
    pub fn parse(code: &str, default: GroupType) -> GroupType {
        match code {
            "G" => GroupType::Normal,
            "U" => GroupType::User,
            _ => default,
        }
    }
}

impl core::fmt::Display for GroupType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Identifies a single permissions group.
///
/// Equality and hashing cover all three fields. `name` and `world` are
/// lower-cased on construction so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId {
    name: String,
    world: String,
    group_type: GroupType,
}

impl GroupId {
    pub fn new(world: impl AsRef<str>, group_type: GroupType, name: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().to_lowercase(),
            world: world.as_ref().to_lowercase(),
            group_type,
        }
    }

    /// Relatively unique name of the group (unique within world and type).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// World id for which the group is applicable.
    pub fn world(&self) -> &str {
        &self.world
    }

    pub fn group_type(&self) -> GroupType {
        self.group_type
    }

    /// Server-unique full name: `name/world/type`.
    ///
    /// Used for display and for legacy serialized identifiers.
    pub fn canonical_name(&self) -> String {
        format!("{}/{}/{}", self.name, self.world, self.group_type)
    }
}

impl core::fmt::Display for GroupId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.world, self.group_type)
    }
}

impl FromStr for GroupId {
    type Err = PermError;

    /// Parses the canonical `name/world/type` form.
    ///
    /// Unknown type codes fall back to [`GroupType::Normal`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.splitn(3, '/');
        let (Some(name), Some(world), Some(code)) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(PermError::invalid_id(format!("GroupId: {s}")));
        };

        if name.is_empty() || world.is_empty() {
            return Err(PermError::invalid_id(format!("GroupId: {s}")));
        }

        Ok(GroupId::new(
            world,
            GroupType::parse(code, GroupType::Normal),
            name,
        ))
    }
}
