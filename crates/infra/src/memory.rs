//! In-memory backend for tests/dev.
//!
//! Mirrors engine mutations as flat relational-style rows — the layout a SQL
//! backend would persist — so tests can assert on exactly what the engine
//! reported. Strict about the contract: calls that violate the engine's
//! stated preconditions are rejected rather than patched up.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use permgrid_core::GroupId;
use permgrid_engine::backend::{Backend, BackendError, BackendResult};
use permgrid_engine::group::{DataKind, DataValue};
use permgrid_engine::node::NodeInfo;
use permgrid_engine::rule::NodeEffect;
use uuid::Uuid;

/// One persisted group.
#[derive(Debug, Clone)]
pub struct GroupRow {
    pub record_id: Uuid,
    pub group: GroupId,
    pub primary_parent: Option<GroupId>,
    pub created_at: DateTime<Utc>,
}

/// One persisted permission node.
#[derive(Debug, Clone)]
pub struct NodeRow {
    pub record_id: Uuid,
    pub group: GroupId,
    pub path: String,
    pub effect: NodeEffect,
    pub priority: i64,
    pub updated_at: DateTime<Utc>,
}

/// One persisted inheritance edge: `group` inherits from `parent`.
#[derive(Debug, Clone)]
pub struct EdgeRow {
    pub record_id: Uuid,
    pub group: GroupId,
    pub parent: GroupId,
    pub created_at: DateTime<Utc>,
}

/// One persisted metadata entry.
#[derive(Debug, Clone)]
pub struct DataRow {
    pub record_id: Uuid,
    pub group: GroupId,
    pub key: String,
    pub kind: DataKind,
    pub value: DataValue,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    groups: Vec<GroupRow>,
    nodes: Vec<NodeRow>,
    edges: Vec<EdgeRow>,
    data: Vec<DataRow>,
}

/// In-memory [`Backend`].
///
/// - No IO / no async
/// - Rows live for the process lifetime
/// - Precondition violations come back as [`BackendError::Rejected`]
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn group_rows(&self) -> Vec<GroupRow> {
        self.state().groups.clone()
    }

    pub fn node_rows(&self) -> Vec<NodeRow> {
        self.state().nodes.clone()
    }

    pub fn edge_rows(&self) -> Vec<EdgeRow> {
        self.state().edges.clone()
    }

    pub fn data_rows(&self) -> Vec<DataRow> {
        self.state().data.clone()
    }

    /// Persisted node paths of one group, sorted for stable assertions.
    pub fn node_paths(&self, group: &GroupId) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state()
            .nodes
            .iter()
            .filter(|row| &row.group == group)
            .map(|row| row.path.clone())
            .collect();
        paths.sort();
        paths
    }

    fn rejected(what: impl Into<String>) -> BackendError {
        BackendError::Rejected(what.into())
    }
}

impl Backend for MemoryBackend {
    fn create_group(&self, group: &GroupId) -> BackendResult {
        let mut state = self.state();
        if state.groups.iter().any(|row| &row.group == group) {
            return Err(Self::rejected(format!("group exists: {group}")));
        }

        state.groups.push(GroupRow {
            record_id: Uuid::now_v7(),
            group: group.clone(),
            primary_parent: None,
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn remove_group(&self, group: &GroupId) -> BackendResult {
        let mut state = self.state();
        let before = state.groups.len();
        state.groups.retain(|row| &row.group != group);
        if state.groups.len() == before {
            return Err(Self::rejected(format!("group missing: {group}")));
        }

        // Cascade, like a relational backend with ON DELETE CASCADE would.
        state.nodes.retain(|row| &row.group != group);
        state.data.retain(|row| &row.group != group);
        state
            .edges
            .retain(|row| &row.group != group && &row.parent != group);
        Ok(())
    }

    fn create_node(&self, node: &NodeInfo) -> BackendResult {
        let mut state = self.state();
        let path = node.path_string();
        if state
            .nodes
            .iter()
            .any(|row| &row.group == node.group() && row.path == path)
        {
            return Err(Self::rejected(format!("node exists: {path}")));
        }

        state.nodes.push(NodeRow {
            record_id: Uuid::now_v7(),
            group: node.group().clone(),
            path,
            effect: node.effect(),
            priority: node.priority(),
            updated_at: Utc::now(),
        });
        Ok(())
    }

    fn remove_node(&self, node: &NodeInfo) -> BackendResult {
        let mut state = self.state();
        let path = node.path_string();
        let descendant_prefix = format!("{path}.");

        let before = state.nodes.len();
        state.nodes.retain(|row| {
            &row.group != node.group()
                || (row.path != path && !row.path.starts_with(&descendant_prefix))
        });
        if state.nodes.len() == before {
            return Err(Self::rejected(format!("node missing: {path}")));
        }
        Ok(())
    }

    fn update_node(&self, node: &NodeInfo) -> BackendResult {
        let mut state = self.state();
        let path = node.path_string();
        let row = state
            .nodes
            .iter_mut()
            .find(|row| &row.group == node.group() && row.path == path)
            .ok_or_else(|| Self::rejected(format!("node missing: {path}")))?;

        row.effect = node.effect();
        row.priority = node.priority();
        row.updated_at = Utc::now();
        Ok(())
    }

    fn add_inherited_group(&self, group: &GroupId, parent: &GroupId) -> BackendResult {
        let mut state = self.state();
        if state
            .edges
            .iter()
            .any(|row| &row.group == group && &row.parent == parent)
        {
            return Err(Self::rejected(format!("edge exists: {group} -> {parent}")));
        }

        state.edges.push(EdgeRow {
            record_id: Uuid::now_v7(),
            group: group.clone(),
            parent: parent.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn remove_inherited_group(&self, group: &GroupId, parent: &GroupId) -> BackendResult {
        let mut state = self.state();
        let before = state.edges.len();
        state
            .edges
            .retain(|row| !(&row.group == group && &row.parent == parent));
        if state.edges.len() == before {
            return Err(Self::rejected(format!("edge missing: {group} -> {parent}")));
        }
        Ok(())
    }

    fn update_primary_parent(&self, group: &GroupId, parent: Option<&GroupId>) -> BackendResult {
        let mut state = self.state();
        let row = state
            .groups
            .iter_mut()
            .find(|row| &row.group == group)
            .ok_or_else(|| Self::rejected(format!("group missing: {group}")))?;

        row.primary_parent = parent.cloned();
        Ok(())
    }

    fn add_group_data(&self, group: &GroupId, key: &str, value: &DataValue) -> BackendResult {
        let mut state = self.state();
        if state
            .data
            .iter()
            .any(|row| &row.group == group && row.key == key)
        {
            return Err(Self::rejected(format!("data exists: {group} {key}")));
        }

        state.data.push(DataRow {
            record_id: Uuid::now_v7(),
            group: group.clone(),
            key: key.to_string(),
            kind: value.kind(),
            value: value.clone(),
            updated_at: Utc::now(),
        });
        Ok(())
    }

    fn update_group_data(&self, group: &GroupId, key: &str, value: &DataValue) -> BackendResult {
        let mut state = self.state();
        let row = state
            .data
            .iter_mut()
            .find(|row| &row.group == group && row.key == key)
            .ok_or_else(|| Self::rejected(format!("data missing: {group} {key}")))?;

        row.kind = value.kind();
        row.value = value.clone();
        row.updated_at = Utc::now();
        Ok(())
    }

    fn remove_group_data(&self, group: &GroupId, key: &str) -> BackendResult {
        let mut state = self.state();
        let before = state.data.len();
        state
            .data
            .retain(|row| !(&row.group == group && row.key == key));
        if state.data.len() == before {
            return Err(Self::rejected(format!("data missing: {group} {key}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use permgrid_core::GroupType;
    use permgrid_engine::group::DataValue;
    use permgrid_engine::manager::PermissionsManager;
    use permgrid_engine::rule::NodeEffect;

    use super::*;

    fn harness() -> (PermissionsManager, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let manager = PermissionsManager::new(Arc::clone(&backend) as Arc<dyn Backend>);
        (manager, backend)
    }

    #[test]
    fn group_creation_is_persisted_once() {
        let (manager, backend) = harness();
        let mods = manager.group_id("w", GroupType::Normal, "mods");

        assert!(manager.create_group(&mods));
        assert!(!manager.create_group(&mods));
        assert_eq!(backend.group_rows().len(), 1);
        assert_eq!(backend.group_rows()[0].group, mods);
    }

    #[test]
    fn node_rows_track_tree_structure() {
        let (manager, backend) = harness();
        manager.player_add("w", "alice", "build.place.stone");

        let alice = manager.group_id("w", GroupType::User, "alice");
        assert_eq!(
            backend.node_paths(&alice),
            vec!["build", "build.place", "build.place.stone"]
        );

        // Merging into existing nodes creates no new rows.
        manager.player_add("w", "alice", "build.place");
        assert_eq!(backend.node_paths(&alice).len(), 3);

        // Removing a path drops its whole persisted subtree.
        manager.player_remove("w", "alice", "build.place");
        assert_eq!(backend.node_paths(&alice), vec!["build"]);
    }

    #[test]
    fn deny_nodes_persist_their_effect_and_priority() {
        let (manager, backend) = harness();
        manager.player_add("w", "alice", "-chat.color");

        let alice = manager.group_id("w", GroupType::User, "alice");
        let rows = backend.node_rows();
        let deny = rows
            .iter()
            .find(|row| row.group == alice && row.path == "chat.color")
            .unwrap();
        assert_eq!(deny.effect, NodeEffect::Deny);
        assert_eq!(deny.priority, 1100);
    }

    #[test]
    fn inheritance_edges_round_trip() {
        let (manager, backend) = harness();
        let mods = manager.group_id("w", GroupType::Normal, "mods");
        manager.create_group(&mods);

        manager.player_add_group("w", "alice", "mods");
        assert_eq!(backend.edge_rows().len(), 1);

        // A redundant add makes no backend call at all.
        manager.player_add_group("w", "alice", "mods");
        assert_eq!(backend.edge_rows().len(), 1);

        manager.player_remove_group("w", "alice", "mods");
        assert!(backend.edge_rows().is_empty());
    }

    #[test]
    fn primary_parent_updates_the_group_row() {
        let (manager, backend) = harness();
        let vip = manager.group_id("w", GroupType::Normal, "vip");
        manager.create_group(&vip);
        manager.set_primary_group("w", "dave", Some("vip"));

        let dave = manager.group_id("w", GroupType::User, "dave");
        let rows = backend.group_rows();
        let row = rows.iter().find(|row| row.group == dave).unwrap();
        assert_eq!(row.primary_parent.as_ref(), Some(&vip));
    }

    #[test]
    fn metadata_selects_insert_vs_update() -> anyhow::Result<()> {
        let (manager, backend) = harness();
        let vip = manager.group_id("w", GroupType::Normal, "vip");
        manager.create_group(&vip);

        manager.set_group_data(&vip, "prefix", DataValue::from("[VIP] "));
        manager.set_group_data(&vip, "prefix", DataValue::from("[vip] "));
        manager.set_group_data(&vip, "weight", DataValue::from(10i64));

        let rows = backend.data_rows();
        assert_eq!(rows.len(), 2);

        let prefix = rows
            .iter()
            .find(|row| row.key == "prefix")
            .ok_or_else(|| anyhow::anyhow!("prefix row missing"))?;
        assert_eq!(prefix.kind, DataKind::Str);
        assert_eq!(prefix.value.as_str(), Some("[vip] "));

        manager.remove_group_data(&vip, "prefix");
        assert_eq!(backend.data_rows().len(), 1);
        Ok(())
    }

    #[test]
    fn removing_a_group_cascades_its_rows() {
        let (manager, backend) = harness();
        let mods = manager.group_id("w", GroupType::Normal, "mods");
        manager.create_group(&mods);
        manager.group_add("w", "mods", "kick");
        manager.set_group_data(&mods, "prefix", DataValue::from("[mod] "));
        manager.player_add_group("w", "alice", "mods");

        manager.remove_group(&mods);
        assert!(backend.edge_rows().is_empty());
        assert!(
            backend
                .node_rows()
                .iter()
                .all(|row| row.group != mods)
        );
        assert!(backend.data_rows().is_empty());
        assert_eq!(backend.group_rows().len(), 1); // alice's pseudo-group survives
    }

    #[test]
    fn engine_answers_are_unaffected_by_backend_rejections() {
        let (manager, backend) = harness();
        // Force a rejection by pre-seeding a conflicting row.
        let mods = manager.group_id("w", GroupType::Normal, "mods");
        backend.create_group(&mods).unwrap();

        // The engine's create still succeeds in memory; the backend call
        // fails and is only logged.
        assert!(manager.create_group(&mods));
        manager.group_add("w", "mods", "kick");
        manager.player_add_group("w", "alice", "mods");
        assert!(manager.has("w", "alice", "kick"));
    }
}
