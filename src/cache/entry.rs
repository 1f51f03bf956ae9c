//! Cache Entry Module
//!
//! Defines the structure for individual cache entries.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::cache::{CacheType, NodeId};

// == Cache Entry ==
/// A single cached representation of a resource under one encoding.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Encoding half of the full key
    pub encoding: String,
    /// Logical key (normally the URL)
    pub key: String,
    /// The stored bytes
    pub data: Bytes,
    /// Response headers attached to this representation
    pub headers: HashMap<String, String>,
    /// Retention policy
    pub cache_type: CacheType,
    /// Time the entry was installed (Unix milliseconds)
    pub created_at: u64,
    /// LRU handle, present iff the entry is not permanent
    pub node: Option<NodeId>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    pub fn new(
        encoding: &str,
        key: &str,
        data: Bytes,
        headers: HashMap<String, String>,
        cache_type: CacheType,
    ) -> Self {
        Self {
            encoding: encoding.to_string(),
            key: key.to_string(),
            data,
            headers,
            cache_type,
            created_at: current_timestamp_ms(),
            node: None,
        }
    }

    // == Size ==
    /// Size of the stored bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new(
            "plain",
            "/index.html",
            Bytes::from_static(b"hello"),
            HashMap::new(),
            CacheType::Weak,
        );

        assert_eq!(entry.key, "/index.html");
        assert_eq!(entry.size(), 5);
        assert!(entry.node.is_none());
        assert!(entry.created_at > 0);
    }

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let a = current_timestamp_ms();
        let b = current_timestamp_ms();
        assert!(b >= a);
    }
}
