//! Cache Store Module
//!
//! Main cache engine combining a full-key map with an arena LRU list, an expiry tracker for
//! weak entries and a key→encoding index.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use regex::Regex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::cache::{
    full_key, CacheEntry, CacheStats, CacheType, DeadlineQueue, ExpiryTracker, LruList,
    ENCODING_PLAIN,
};
use crate::config::Config;

// == Store Event ==
/// Notification emitted after the store changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// An entry was installed
    Set {
        key: String,
        encoding: String,
        cache_type: CacheType,
    },
    /// An entry was removed by clear, eviction or expiry
    Clear {
        key: String,
        encoding: String,
        /// Whether other encodings of the same key are still cached
        remaining: bool,
    },
}

// == Cache Store ==
/// Bounded multi-encoding cache with LRU eviction and TTL expiry.
///
/// Every operation reports failure through `bool`/`Option` returns; nothing here errors.
#[derive(Debug)]
pub struct CacheStore {
    /// Full key → entry
    entries: HashMap<String, CacheEntry>,
    /// Logical key → encodings currently cached
    encodings: HashMap<String, HashSet<String>>,
    /// Recency of weak and strong entries
    lru: LruList,
    /// Deadlines of weak entries
    expiry: Box<dyn ExpiryTracker>,
    stats: CacheStats,
    /// Sum of every entry size, permanent included
    total_size: usize,
    permanent_size: usize,
    max_size: usize,
    max_entry_size: usize,
    /// TTL of weak entries in seconds
    cache_life: u64,
    /// Whether permanent bytes count against `max_size`
    budget_permanent: bool,
    listeners: Vec<UnboundedSender<StoreEvent>>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `max_size` - Byte budget for evictable entries
    /// * `max_entry_size` - Largest non-permanent entry accepted
    /// * `cache_life` - TTL in seconds for weak entries
    pub fn new(max_size: usize, max_entry_size: usize, cache_life: u64) -> Self {
        Self {
            entries: HashMap::new(),
            encodings: HashMap::new(),
            lru: LruList::new(),
            expiry: Box::new(DeadlineQueue::new()),
            stats: CacheStats::new(),
            total_size: 0,
            permanent_size: 0,
            max_size,
            max_entry_size,
            cache_life,
            budget_permanent: true,
            listeners: Vec::new(),
        }
    }

    /// Creates a store sized from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_size, config.max_entry_size, config.cache_life)
            .with_budget_permanent(config.budget_permanent)
    }

    /// Replaces the default deadline queue.
    pub fn with_expiry_tracker(mut self, tracker: Box<dyn ExpiryTracker>) -> Self {
        self.expiry = tracker;
        self
    }

    /// Chooses whether permanent bytes count against the size budget.
    pub fn with_budget_permanent(mut self, budget_permanent: bool) -> Self {
        self.budget_permanent = budget_permanent;
        self
    }

    // == Subscribe ==
    /// Registers a listener for set/clear notifications.
    pub fn subscribe(&mut self) -> UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        rx
    }

    // == Set ==
    /// Stores `data` under `(encoding, key)`.
    ///
    /// Returns false without touching the store when `cache_type` is `None` or when a
    /// non-permanent entry is larger than `max_entry_size`. Headers of a replaced entry
    /// carry over to the new one.
    pub fn set(
        &mut self,
        encoding: &str,
        key: &str,
        data: impl Into<Bytes>,
        cache_type: CacheType,
    ) -> bool {
        if cache_type == CacheType::None {
            return false;
        }

        let data = data.into();
        let size = data.len();
        if size > self.max_entry_size && cache_type != CacheType::Permanent {
            debug!(key, encoding, size, "entry exceeds max entry size, not cached");
            return false;
        }

        let fk = full_key(encoding, key);
        let headers = self
            .remove_entry(&fk, false)
            .map(|old| old.headers)
            .unwrap_or_default();

        let mut entry = CacheEntry::new(encoding, key, data, headers, cache_type);
        if cache_type.is_evictable() {
            entry.node = Some(self.lru.push_front(&fk, size));
        } else {
            self.permanent_size += size;
        }
        if cache_type == CacheType::Weak {
            self.expiry.expire(std::slice::from_ref(&fk), self.cache_life);
        }

        self.entries.insert(fk, entry);
        self.encodings
            .entry(key.to_string())
            .or_default()
            .insert(encoding.to_string());
        self.total_size += size;

        self.emit(StoreEvent::Set {
            key: key.to_string(),
            encoding: encoding.to_string(),
            cache_type,
        });

        self.evict_to_budget();
        true
    }

    // == Get ==
    /// Retrieves the bytes for `(encoding, key)`, marking the entry as recently used and
    /// refreshing the deadline of weak entries.
    pub fn get(&mut self, encoding: &str, key: &str) -> Option<Bytes> {
        let fk = full_key(encoding, key);
        let entry = self.entries.get(&fk)?;
        if let Some(node) = entry.node {
            self.lru.touch(node);
        }
        if entry.cache_type == CacheType::Weak {
            self.expiry.expire(std::slice::from_ref(&fk), self.cache_life);
        }
        Some(entry.data.clone())
    }

    // == Has ==
    /// Existence check without side effects.
    pub fn has(&self, encoding: &str, key: &str) -> bool {
        self.entries.contains_key(&full_key(encoding, key))
    }

    // == Modified Time ==
    /// Install time of the entry in Unix milliseconds. Marks the entry as recently used.
    pub fn modified_time(&mut self, encoding: &str, key: &str) -> Option<u64> {
        let entry = self.entries.get(&full_key(encoding, key))?;
        if let Some(node) = entry.node {
            self.lru.touch(node);
        }
        Some(entry.created_at)
    }

    /// Retention policy of a cached entry.
    pub fn cache_type(&self, encoding: &str, key: &str) -> Option<CacheType> {
        self.entries
            .get(&full_key(encoding, key))
            .map(|entry| entry.cache_type)
    }

    /// Current TTL deadline of a weak entry.
    pub fn expiry_deadline(&self, encoding: &str, key: &str) -> Option<u64> {
        self.expiry.deadline(&full_key(encoding, key))
    }

    /// Encodings currently cached for a key.
    pub fn encodings(&self, key: &str) -> Vec<String> {
        self.encodings
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    // == Clear ==
    /// Removes one encoding of `key`, or every encoding when `encoding` is `None`.
    ///
    /// Returns true if anything was removed.
    pub fn clear(&mut self, encoding: Option<&str>, key: &str) -> bool {
        match encoding {
            Some(encoding) => self.remove_entry(&full_key(encoding, key), true).is_some(),
            None => {
                let mut removed = false;
                for encoding in self.encodings(key) {
                    removed |= self.remove_entry(&full_key(&encoding, key), true).is_some();
                }
                removed
            }
        }
    }

    // == Clear Matches ==
    /// Clears every entry whose full key matches `pattern`. Returns the number removed.
    pub fn clear_matches(&mut self, pattern: &Regex) -> usize {
        let matched: Vec<String> = self
            .entries
            .keys()
            .filter(|fk| pattern.is_match(fk))
            .cloned()
            .collect();

        matched
            .iter()
            .filter(|fk| self.remove_entry(fk, true).is_some())
            .count()
    }

    // == Purge Expired ==
    /// Clears every weak entry whose deadline has passed. Returns the number removed.
    pub fn purge_expired(&mut self) -> usize {
        let expired = self.expiry.extract_expired_keys();
        let count = expired
            .iter()
            .filter(|fk| self.remove_entry(fk, true).is_some())
            .count();
        self.stats.record_expirations(count);
        count
    }

    // == Headers ==
    /// Sets one header on an existing entry. Returns false if the entry is absent.
    pub fn set_header(&mut self, encoding: &str, key: &str, name: &str, value: &str) -> bool {
        match self.entries.get_mut(&full_key(encoding, key)) {
            Some(entry) => {
                entry.headers.insert(name.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    /// Merges a header map into an existing entry.
    pub fn set_headers(
        &mut self,
        encoding: &str,
        key: &str,
        headers: &HashMap<String, String>,
    ) -> bool {
        match self.entries.get_mut(&full_key(encoding, key)) {
            Some(entry) => {
                for (name, value) in headers {
                    entry.headers.insert(name.clone(), value.clone());
                }
                true
            }
            None => false,
        }
    }

    /// Reads one header, falling back to the plain entry of the same key.
    pub fn get_header(&self, encoding: &str, key: &str, name: &str) -> Option<String> {
        self.entries
            .get(&full_key(encoding, key))
            .and_then(|entry| entry.headers.get(name))
            .or_else(|| {
                self.entries
                    .get(&full_key(ENCODING_PLAIN, key))
                    .and_then(|entry| entry.headers.get(name))
            })
            .cloned()
    }

    /// All headers of an entry; empty when the entry is absent.
    pub fn get_headers(&self, encoding: &str, key: &str) -> HashMap<String, String> {
        self.entries
            .get(&full_key(encoding, key))
            .map(|entry| entry.headers.clone())
            .unwrap_or_default()
    }

    pub fn clear_header(&mut self, encoding: &str, key: &str, name: &str) {
        if let Some(entry) = self.entries.get_mut(&full_key(encoding, key)) {
            entry.headers.remove(name);
        }
    }

    pub fn clear_headers(&mut self, encoding: &str, key: &str) {
        if let Some(entry) = self.entries.get_mut(&full_key(encoding, key)) {
            entry.headers.clear();
        }
    }

    // == Reset ==
    /// Drops every entry without emitting notifications.
    pub fn reset(&mut self) {
        let weak: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.cache_type == CacheType::Weak)
            .map(|(fk, _)| fk.clone())
            .collect();
        self.expiry.unexpire(&weak);
        self.entries.clear();
        self.encodings.clear();
        self.lru = LruList::new();
        self.total_size = 0;
        self.permanent_size = 0;
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.entries.len();
        stats.total_size = self.total_size;
        stats
    }

    pub fn record_hit(&mut self) {
        self.stats.record_hit();
    }

    pub fn record_miss(&mut self) {
        self.stats.record_miss();
    }

    /// Sum of every entry size, permanent included.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Sum of weak and strong entry sizes.
    pub fn evictable_size(&self) -> usize {
        self.total_size - self.permanent_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Keys in recency order, most recent first.
    pub fn lru_keys(&self) -> Vec<String> {
        self.lru.keys()
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn budgeted_size(&self) -> usize {
        if self.budget_permanent {
            self.total_size
        } else {
            self.evictable_size()
        }
    }

    fn evict_to_budget(&mut self) {
        while self.budgeted_size() > self.max_size {
            let Some(oldest) = self.lru.oldest().map(str::to_string) else {
                break;
            };
            if self.remove_entry(&oldest, true).is_none() {
                break;
            }
            self.stats.record_eviction();
            debug!(key = %oldest, total_size = self.total_size, "evicted least recently used entry");
        }
    }

    fn remove_entry(&mut self, fk: &str, notify: bool) -> Option<CacheEntry> {
        let entry = self.entries.remove(fk)?;
        let size = entry.size();

        match entry.node {
            Some(node) => {
                self.lru.remove(node);
            }
            None => self.permanent_size -= size,
        }
        self.total_size -= size;
        if entry.cache_type == CacheType::Weak {
            self.expiry.unexpire(&[fk.to_string()]);
        }

        let remaining = match self.encodings.get_mut(&entry.key) {
            Some(set) => {
                set.remove(&entry.encoding);
                if set.is_empty() {
                    self.encodings.remove(&entry.key);
                    false
                } else {
                    true
                }
            }
            None => false,
        };

        if notify {
            self.emit(StoreEvent::Clear {
                key: entry.key.clone(),
                encoding: entry.encoding.clone(),
                remaining,
            });
        }
        Some(entry)
    }

    fn emit(&mut self, event: StoreEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
