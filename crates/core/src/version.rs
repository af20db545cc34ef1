//! Cache-version stamps for change detection.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Opaque stamp identifying a cached snapshot version.
///
/// A fresh stamp is produced on every structural mutation of the carrying
/// store; downstream caches compare stamps to detect staleness. Stamps carry
/// no meaning beyond change detection — two stamps are either equal or not.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheVersion(u64);

impl CacheVersion {
    /// Produces a stamp no store has carried before.
    ///
    /// Drawn from a process-wide monotonic counter, so collisions are
    /// impossible within a process lifetime.
    pub fn next() -> Self {
        Self(NEXT_VERSION.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CacheVersion {
    fn default() -> Self {
        Self::next()
    }
}

/// A store that carries a cache-version stamp.
pub trait Versioned {
    /// Current snapshot stamp.
    fn cache_version(&self) -> CacheVersion;
}
