//! Domain error model.

use thiserror::Error;

/// Result type used across the engine.
pub type PermResult<T> = Result<T, PermError>;

/// Engine-level error.
///
/// Resolution never fails: unknown subjects, malformed priority prefixes and
/// cyclic inheritance all degrade to absence values (see the manager and node
/// parsing docs). Errors exist for identifier parsing and configuration only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermError {
    /// An identifier was invalid (e.g. canonical-form parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A value failed validation (e.g. malformed configuration).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl PermError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
