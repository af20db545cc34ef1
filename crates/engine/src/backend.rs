//! Persistence collaborator contract.
//!
//! The engine calls the backend on every mutation and never on reads — the
//! backend's role is durability, not participation in resolution. Every call
//! is attempted at most once; failures are logged and never surfaced into a
//! decision.

use permgrid_core::GroupId;
use thiserror::Error;

use crate::group::DataValue;
use crate::node::NodeInfo;

/// Backend-side failure. Never observed by resolution callers.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage rejected the change: {0}")]
    Rejected(String),
}

pub type BackendResult = Result<(), BackendError>;

/// Stores and retrieves permission data on behalf of the engine.
///
/// Precondition contract (implementations may rely on it): `create_node` and
/// `update_node` are only called for nodes whose parent already exists, and
/// remove/update calls only target entities the engine believes exist.
pub trait Backend: Send + Sync {
    /// Creates a new group.
    fn create_group(&self, group: &GroupId) -> BackendResult;

    /// Removes a group. The group has already been severed from every other
    /// group's inheritance.
    fn remove_group(&self, group: &GroupId) -> BackendResult;

    /// Creates a new node.
    fn create_node(&self, node: &NodeInfo) -> BackendResult;

    /// Removes a node and any children it may have.
    fn remove_node(&self, node: &NodeInfo) -> BackendResult;

    /// Updates a node's priority and effect without structural change.
    fn update_node(&self, node: &NodeInfo) -> BackendResult;

    /// Records that `group` inherits from `parent`.
    fn add_inherited_group(&self, group: &GroupId, parent: &GroupId) -> BackendResult;

    /// Records that `group` no longer inherits from `parent`.
    fn remove_inherited_group(&self, group: &GroupId, parent: &GroupId) -> BackendResult;

    /// Updates a group's primary parent. A non-empty parent is guaranteed to
    /// already be inherited.
    fn update_primary_parent(&self, group: &GroupId, parent: Option<&GroupId>) -> BackendResult;

    /// Adds a metadata entry. The key is guaranteed to be absent.
    fn add_group_data(&self, group: &GroupId, key: &str, value: &DataValue) -> BackendResult;

    /// Updates an existing metadata entry. The value's kind may differ from
    /// the stored one, but the key is guaranteed to exist.
    fn update_group_data(&self, group: &GroupId, key: &str, value: &DataValue) -> BackendResult;

    /// Removes an existing metadata entry.
    fn remove_group_data(&self, group: &GroupId, key: &str) -> BackendResult;
}

/// Discards every call. The default collaborator for ephemeral managers and
/// tests that don't assert on persistence.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn create_group(&self, _group: &GroupId) -> BackendResult {
        Ok(())
    }

    fn remove_group(&self, _group: &GroupId) -> BackendResult {
        Ok(())
    }

    fn create_node(&self, _node: &NodeInfo) -> BackendResult {
        Ok(())
    }

    fn remove_node(&self, _node: &NodeInfo) -> BackendResult {
        Ok(())
    }

    fn update_node(&self, _node: &NodeInfo) -> BackendResult {
        Ok(())
    }

    fn add_inherited_group(&self, _group: &GroupId, _parent: &GroupId) -> BackendResult {
        Ok(())
    }

    fn remove_inherited_group(&self, _group: &GroupId, _parent: &GroupId) -> BackendResult {
        Ok(())
    }

    fn update_primary_parent(&self, _group: &GroupId, _parent: Option<&GroupId>) -> BackendResult {
        Ok(())
    }

    fn add_group_data(&self, _group: &GroupId, _key: &str, _value: &DataValue) -> BackendResult {
        Ok(())
    }

    fn update_group_data(&self, _group: &GroupId, _key: &str, _value: &DataValue) -> BackendResult {
        Ok(())
    }

    fn remove_group_data(&self, _group: &GroupId, _key: &str) -> BackendResult {
        Ok(())
    }
}

/// Logs a failed backend call and moves on. The engine never retries and
/// never lets storage trouble change an authorization answer.
pub(crate) fn log_failure(op: &'static str, result: BackendResult) {
    if let Err(error) = result {
        tracing::warn!(%error, op, "backend call failed; in-memory state is ahead of storage");
    }
}
