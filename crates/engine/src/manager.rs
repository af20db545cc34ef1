//! Top-level resolution facade.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use permgrid_core::{CacheVersion, Component, GroupId, GroupType, Versioned};
use serde::Deserialize;

use crate::backend::{self, Backend};
use crate::group::{DataValue, Group, GroupCache};

/// The default default id. No, that's not a typo: both the default world id
/// and the default group name can be changed via configuration.
const DEFAULT_ID: &str = "default";

/// Manager configuration: default ids and the world alias table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// World id used for any world without an alias entry.
    pub default_world_id: String,
    /// Name of the group users fall back to when they have no group of
    /// their own.
    pub default_group: String,
    /// Maps world names to world ids, so several worlds can share one
    /// permission namespace.
    pub world_aliases: HashMap<String, String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_world_id: DEFAULT_ID.to_string(),
            default_group: DEFAULT_ID.to_string(),
            world_aliases: HashMap::new(),
        }
    }
}

#[derive(Debug)]
struct ManagerState {
    groups: GroupCache,
    world_ids: HashMap<String, String>,
    default_world_id: String,
    default_group_id: GroupId,
}

impl ManagerState {
    /// Converts a world name to a world id through the alias table, falling
    /// back to the default world id.
    fn world_id(&self, world: &str) -> &str {
        self.world_ids
            .get(world)
            .map(String::as_str)
            .unwrap_or(&self.default_world_id)
    }

    fn group_id(&self, world: &str, group_type: GroupType, name: &str) -> GroupId {
        GroupId::new(self.world_id(world), group_type, name)
    }

    fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    /// The group if cached; otherwise the configured default group, if that
    /// one exists.
    fn group_or_default(&self, id: &GroupId) -> Option<&Group> {
        self.group(id).or_else(|| self.group(&self.default_group_id))
    }

    fn group_or_create(&mut self, id: GroupId, backend: &dyn Backend) -> &mut Group {
        self.groups.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(group = %id, "group created");
            backend::log_failure("create_group", backend.create_group(&id));
            Group::new(id.clone())
        })
    }
}

/// Resolves `(world, subject, permission)` triples into decisions and owns
/// the in-memory group cache.
///
/// Reads run concurrently; any mutation excludes readers and other mutators
/// for the duration of the structural change. Persistence goes through the
/// [`Backend`] collaborator on every mutation and never on reads.
pub struct PermissionsManager {
    state: RwLock<ManagerState>,
    backend: Arc<dyn Backend>,
}

impl PermissionsManager {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_config(ManagerConfig::default(), backend)
    }

    pub fn with_config(config: ManagerConfig, backend: Arc<dyn Backend>) -> Self {
        let default_world_id = config.default_world_id.to_lowercase();
        let default_group_id = GroupId::new(
            &default_world_id,
            GroupType::Normal,
            &config.default_group,
        );

        Self {
            state: RwLock::new(ManagerState {
                groups: GroupCache::new(),
                world_ids: config.world_aliases,
                default_world_id,
                default_group_id,
            }),
            backend,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Identity & cache inspection
    // ─────────────────────────────────────────────────────────────────────

    /// Builds a server-unique group id from a world NAME (not id), resolving
    /// the world through the alias table.
    pub fn group_id(&self, world: &str, group_type: GroupType, name: &str) -> GroupId {
        self.read_state().group_id(world, group_type, name)
    }

    pub fn contains(&self, id: &GroupId) -> bool {
        self.read_state().groups.contains_key(id)
    }

    /// Ids of every cached group.
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.read_state().groups.keys().cloned().collect()
    }

    /// Current cache stamp of a group, for downstream staleness checks.
    pub fn cache_version(&self, id: &GroupId) -> Option<CacheVersion> {
        self.read_state().group(id).map(Group::cache_version)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Authorization queries
    // ─────────────────────────────────────────────────────────────────────

    /// Whether `player` holds `permission` in `world`.
    ///
    /// Resolves against the player's own pseudo-group, falling back to the
    /// configured default group. A missing subject answers `false`, never an
    /// error.
    pub fn has(&self, world: &str, player: &str, permission: &str) -> bool {
        let state = self.read_state();
        let id = state.group_id(world, GroupType::User, player);
        let Some(group) = state.group_or_default(&id) else {
            return false;
        };

        let rule = group.resolve(permission, &state.groups);
        tracing::trace!(subject = %id, permission, %rule, "resolved player permission");
        rule.allows()
    }

    /// Whether the named group holds `permission` in `world`. No default
    /// group fallback; a missing group answers `false`.
    pub fn group_has(&self, world: &str, group: &str, permission: &str) -> bool {
        let state = self.read_state();
        let id = state.group_id(world, GroupType::Normal, group);
        let Some(group) = state.group(&id) else {
            return false;
        };

        group.resolve(permission, &state.groups).allows()
    }

    /// Whether the player inherits the named group, directly or indirectly.
    pub fn player_in_group(&self, world: &str, player: &str, group: &str) -> bool {
        let state = self.read_state();
        let group_id = state.group_id(world, GroupType::Normal, group);
        let user_id = state.group_id(world, GroupType::User, player);

        match (state.group(&group_id), state.group(&user_id)) {
            (Some(_), Some(user)) => user.is_inherited(&group_id, &state.groups),
            _ => false,
        }
    }

    /// Canonical names of every group the player belongs to, including the
    /// player's own pseudo-group. Empty when the player is unknown.
    pub fn player_groups(&self, world: &str, player: &str) -> Vec<String> {
        let state = self.read_state();
        let id = state.group_id(world, GroupType::User, player);
        match state.group(&id) {
            Some(user) => user.closure_names(&state.groups).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Canonical name of the player's primary group, if any.
    pub fn primary_group(&self, world: &str, player: &str) -> Option<String> {
        let state = self.read_state();
        let id = state.group_id(world, GroupType::User, player);
        state
            .group(&id)
            .and_then(Group::primary_parent)
            .map(GroupId::canonical_name)
    }

    /// Fetches a group metadata value. Metadata is not inherited here;
    /// callers wanting primary-parent fallback follow [`primary_group`].
    ///
    /// [`primary_group`]: PermissionsManager::primary_group
    pub fn group_data(&self, id: &GroupId, key: &str) -> Option<DataValue> {
        self.read_state()
            .group(id)
            .and_then(|group| group.data(key))
            .cloned()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Group lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Creates and registers an empty group. Returns `false` when the id is
    /// already cached.
    pub fn create_group(&self, id: &GroupId) -> bool {
        let mut state = self.write_state();
        if state.groups.contains_key(id) {
            return false;
        }

        state.group_or_create(id.clone(), &*self.backend);
        true
    }

    /// Destroys a group, severing it from every other group's parent set and
    /// primary-parent slot before telling the backend.
    pub fn remove_group(&self, id: &GroupId) -> bool {
        let mut state = self.write_state();
        if !state.groups.contains_key(id) {
            return false;
        }

        let others: Vec<GroupId> = state
            .groups
            .keys()
            .filter(|key| *key != id)
            .cloned()
            .collect();
        for other in others {
            if let Some(group) = state.groups.get_mut(&other) {
                group.sever(id, &*self.backend);
            }
        }

        state.groups.remove(id);
        tracing::debug!(group = %id, "group removed");
        backend::log_failure("remove_group", self.backend.remove_group(id));
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Permission mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Grants (or re-parses) a permission path on a player's own group,
    /// creating the group on demand.
    pub fn player_add(&self, world: &str, player: &str, permission: &str) -> bool {
        let mut state = self.write_state();
        let id = state.group_id(world, GroupType::User, player);
        let user = state.group_or_create(id, &*self.backend);
        user.tree_mut().add_path(permission, &*self.backend);
        true
    }

    /// Removes a permission path from a player's own group. `false` when the
    /// player or the path is unknown.
    pub fn player_remove(&self, world: &str, player: &str, permission: &str) -> bool {
        let mut state = self.write_state();
        let id = state.group_id(world, GroupType::User, player);
        match state.groups.get_mut(&id) {
            Some(user) => user.tree_mut().remove_path(permission, &*self.backend),
            None => false,
        }
    }

    /// Grants a permission path on an existing group. Groups are never
    /// created by this call.
    pub fn group_add(&self, world: &str, group: &str, permission: &str) -> bool {
        let mut state = self.write_state();
        let id = state.group_id(world, GroupType::Normal, group);
        match state.groups.get_mut(&id) {
            Some(group) => {
                group.tree_mut().add_path(permission, &*self.backend);
                true
            }
            None => false,
        }
    }

    /// Removes a permission path from an existing group.
    pub fn group_remove(&self, world: &str, group: &str, permission: &str) -> bool {
        let mut state = self.write_state();
        let id = state.group_id(world, GroupType::Normal, group);
        match state.groups.get_mut(&id) {
            Some(group) => group.tree_mut().remove_path(permission, &*self.backend),
            None => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inheritance mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Adds the player to a group. The target group must already exist; the
    /// player's pseudo-group is created on demand.
    pub fn player_add_group(&self, world: &str, player: &str, group: &str) -> bool {
        let mut state = self.write_state();
        let group_id = state.group_id(world, GroupType::Normal, group);
        if !state.groups.contains_key(&group_id) {
            return false;
        }

        let user_id = state.group_id(world, GroupType::User, player);
        let user = state.group_or_create(user_id, &*self.backend);
        user.inherit(&group_id, &*self.backend)
    }

    /// Removes the player from a group. Both sides must exist.
    pub fn player_remove_group(&self, world: &str, player: &str, group: &str) -> bool {
        let mut state = self.write_state();
        let group_id = state.group_id(world, GroupType::Normal, group);
        if !state.groups.contains_key(&group_id) {
            return false;
        }

        let user_id = state.group_id(world, GroupType::User, player);
        match state.groups.get_mut(&user_id) {
            Some(user) => user.uninherit(&group_id, &*self.backend),
            None => false,
        }
    }

    /// Makes one existing group inherit from another existing group.
    pub fn group_add_parent(&self, world: &str, child: &str, parent: &str) -> bool {
        let mut state = self.write_state();
        let child_id = state.group_id(world, GroupType::Normal, child);
        let parent_id = state.group_id(world, GroupType::Normal, parent);
        if !state.groups.contains_key(&parent_id) {
            return false;
        }

        match state.groups.get_mut(&child_id) {
            Some(child) => child.inherit(&parent_id, &*self.backend),
            None => false,
        }
    }

    /// Breaks a group-to-group inheritance edge.
    pub fn group_remove_parent(&self, world: &str, child: &str, parent: &str) -> bool {
        let mut state = self.write_state();
        let child_id = state.group_id(world, GroupType::Normal, child);
        let parent_id = state.group_id(world, GroupType::Normal, parent);

        match state.groups.get_mut(&child_id) {
            Some(child) => child.uninherit(&parent_id, &*self.backend),
            None => false,
        }
    }

    /// Sets or clears the player's primary group (the metadata-inheritance
    /// parent). Setting a group the player doesn't yet inherit inherits it
    /// first; the target group must exist.
    pub fn set_primary_group(&self, world: &str, player: &str, group: Option<&str>) -> bool {
        let mut state = self.write_state();
        let user_id = state.group_id(world, GroupType::User, player);

        match group {
            Some(group) => {
                let group_id = state.group_id(world, GroupType::Normal, group);
                if !state.groups.contains_key(&group_id) {
                    return false;
                }
                let user = state.group_or_create(user_id, &*self.backend);
                user.set_primary_parent(Some(&group_id), &*self.backend)
            }
            None => match state.groups.get_mut(&user_id) {
                Some(user) => user.set_primary_parent(None, &*self.backend),
                None => false,
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Metadata mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Stores a metadata value on an existing group, last write wins.
    pub fn set_group_data(&self, id: &GroupId, key: &str, value: DataValue) -> bool {
        let mut state = self.write_state();
        match state.groups.get_mut(id) {
            Some(group) => group.set_data(key, value, &*self.backend),
            None => false,
        }
    }

    /// Removes a metadata entry from an existing group.
    pub fn remove_group_data(&self, id: &GroupId, key: &str) -> bool {
        let mut state = self.write_state();
        match state.groups.get_mut(id) {
            Some(group) => group.remove_data(key, &*self.backend),
            None => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // World aliasing & defaults
    // ─────────────────────────────────────────────────────────────────────

    /// Maps a world name to a world id, so several worlds can share one
    /// permission namespace.
    pub fn set_world_alias(&self, world: impl Into<String>, world_id: impl Into<String>) {
        self.write_state()
            .world_ids
            .insert(world.into(), world_id.into());
    }

    pub fn set_default_world(&self, world_id: impl AsRef<str>) {
        self.write_state().default_world_id = world_id.as_ref().to_lowercase();
    }

    pub fn set_default_group(&self, id: GroupId) {
        self.write_state().default_group_id = id;
    }
}

impl Component for PermissionsManager {
    /// Drops the in-memory cache; the backend holds the durable copy.
    fn on_disable(&mut self) {
        self.write_state().groups.clear();
    }

    /// Reload starts from an empty cache and repopulates lazily.
    fn on_reload(&mut self) {
        self.write_state().groups.clear();
    }
}

impl core::fmt::Debug for PermissionsManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.read_state();
        f.debug_struct("PermissionsManager")
            .field("groups", &state.groups.len())
            .field("default_group_id", &state.default_group_id)
            .finish_non_exhaustive()
    }
}
