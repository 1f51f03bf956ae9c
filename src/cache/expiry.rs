//! Expiry Tracker Module
//!
//! Time-ordered registry of deadlines backing the TTL of weak entries.

use std::collections::{BTreeSet, HashMap};

use crate::cache::current_timestamp_ms;

// == Expiry Tracker ==
/// Deadline registry consumed by the cache store.
///
/// Scheduling a key that already has a deadline replaces it.
pub trait ExpiryTracker: Send + Sync + std::fmt::Debug {
    /// Schedules `now + ttl_secs` for every key.
    fn expire(&mut self, keys: &[String], ttl_secs: u64);

    /// Cancels pending deadlines.
    fn unexpire(&mut self, keys: &[String]);

    /// Removes and returns every key whose deadline is not after `now`.
    fn extract_expired_keys(&mut self) -> Vec<String>;

    /// Current deadline for a key (Unix milliseconds).
    fn deadline(&self, key: &str) -> Option<u64>;
}

// == Deadline Queue ==
/// Default [`ExpiryTracker`] ordered by deadline.
#[derive(Debug, Default)]
pub struct DeadlineQueue {
    deadlines: HashMap<String, u64>,
    order: BTreeSet<(u64, String)>,
}

impl DeadlineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same as [`ExpiryTracker::extract_expired_keys`] with an explicit clock.
    pub fn extract_expired_at(&mut self, now: u64) -> Vec<String> {
        let mut expired = Vec::new();
        while let Some((deadline, _)) = self.order.first() {
            if *deadline > now {
                break;
            }
            if let Some((_, key)) = self.order.pop_first() {
                self.deadlines.remove(&key);
                expired.push(key);
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

impl ExpiryTracker for DeadlineQueue {
    fn expire(&mut self, keys: &[String], ttl_secs: u64) {
        let deadline = current_timestamp_ms().saturating_add(ttl_secs.saturating_mul(1000));
        for key in keys {
            if let Some(old) = self.deadlines.insert(key.clone(), deadline) {
                self.order.remove(&(old, key.clone()));
            }
            self.order.insert((deadline, key.clone()));
        }
    }

    fn unexpire(&mut self, keys: &[String]) {
        for key in keys {
            if let Some(old) = self.deadlines.remove(key) {
                self.order.remove(&(old, key.clone()));
            }
        }
    }

    fn extract_expired_keys(&mut self) -> Vec<String> {
        self.extract_expired_at(current_timestamp_ms())
    }

    fn deadline(&self, key: &str) -> Option<u64> {
        self.deadlines.get(key).copied()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_expire_schedules_deadline() {
        let mut queue = DeadlineQueue::new();
        let before = current_timestamp_ms();

        queue.expire(&keys(&["plain::a"]), 10);

        let deadline = queue.deadline("plain::a").unwrap();
        assert!(deadline >= before + 10_000);
        assert!(deadline <= current_timestamp_ms() + 10_000);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let mut queue = DeadlineQueue::new();

        queue.expire(&keys(&["forever"]), u64::MAX);

        assert_eq!(queue.deadline("forever"), Some(u64::MAX));
        assert!(queue.extract_expired_keys().is_empty());
    }

    #[test]
    fn test_last_call_wins() {
        let mut queue = DeadlineQueue::new();

        queue.expire(&keys(&["k"]), 1);
        queue.expire(&keys(&["k"]), 100);

        assert_eq!(queue.len(), 1);
        let now = current_timestamp_ms();
        assert!(queue.extract_expired_at(now + 2_000).is_empty());
        assert_eq!(queue.extract_expired_at(now + 200_000), keys(&["k"]));
    }

    #[test]
    fn test_unexpire_cancels() {
        let mut queue = DeadlineQueue::new();

        queue.expire(&keys(&["a", "b"]), 0);
        queue.unexpire(&keys(&["a"]));

        assert_eq!(queue.extract_expired_keys(), keys(&["b"]));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_extract_is_ordered_and_removes() {
        let mut queue = DeadlineQueue::new();

        queue.expire(&keys(&["late"]), 5);
        queue.expire(&keys(&["early"]), 1);

        let now = current_timestamp_ms();
        assert_eq!(queue.extract_expired_at(now + 1_500), keys(&["early"]));
        assert_eq!(queue.extract_expired_at(now + 10_000), keys(&["late"]));
        assert!(queue.extract_expired_at(now + 10_000).is_empty());
    }
}
