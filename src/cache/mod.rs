//! Cache Module
//!
//! Provides the bounded multi-encoding cache store with LRU eviction and TTL expiry.

use serde::{Deserialize, Serialize};

mod entry;
mod expiry;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use expiry::{DeadlineQueue, ExpiryTracker};
pub use lru::{LruList, NodeId};
pub use stats::CacheStats;
pub use store::{CacheStore, StoreEvent};

// == Public Constants ==
/// Encoding name of the uncompressed canonical form
pub const ENCODING_PLAIN: &str = "plain";

/// Separator between encoding and logical key inside a full key
pub const ENCODING_SEPARATOR: &str = "::";

// == Cache Type ==
/// Retention policy attached to a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// Never stored
    None,
    /// LRU member with a TTL refreshed on access
    Weak,
    /// LRU member without TTL
    #[default]
    Strong,
    /// Exempt from eviction and expiry
    Permanent,
}

impl CacheType {
    /// Returns true for entries that live in the LRU list.
    pub fn is_evictable(self) -> bool {
        matches!(self, CacheType::Weak | CacheType::Strong)
    }
}

/// Builds the full key `encoding::key` identifying one cache entry.
pub fn full_key(encoding: &str, key: &str) -> String {
    format!("{}{}{}", encoding, ENCODING_SEPARATOR, key)
}
