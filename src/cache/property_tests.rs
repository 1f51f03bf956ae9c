//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the store against a simple model.

use proptest::prelude::*;
use std::collections::HashMap;

use crate::cache::{full_key, CacheStore, CacheType};

// == Test Configuration ==
const TEST_MAX_SIZE: usize = 200;
const TEST_MAX_ENTRY_SIZE: usize = 64;
const TEST_CACHE_LIFE: u64 = 300;

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-e]{1,2}".prop_map(|s| format!("/{}", s))
}

fn encoding_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just("plain".to_string()), Just("gzip".to_string())]
}

fn cache_type_strategy() -> impl Strategy<Value = CacheType> {
    prop_oneof![
        Just(CacheType::None),
        Just(CacheType::Weak),
        Just(CacheType::Strong),
        Just(CacheType::Permanent),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set {
        encoding: String,
        key: String,
        size: usize,
        cache_type: CacheType,
    },
    Get {
        encoding: String,
        key: String,
    },
    Clear {
        encoding: Option<String>,
        key: String,
    },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (
            encoding_strategy(),
            key_strategy(),
            0usize..80,
            cache_type_strategy()
        )
            .prop_map(|(encoding, key, size, cache_type)| CacheOp::Set {
                encoding,
                key,
                size,
                cache_type,
            }),
        (encoding_strategy(), key_strategy())
            .prop_map(|(encoding, key)| CacheOp::Get { encoding, key }),
        (prop::option::of(encoding_strategy()), key_strategy())
            .prop_map(|(encoding, key)| CacheOp::Clear { encoding, key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // `has` is true iff the last operation on that full key was a successful set that no
    // clear or eviction has superseded.
    #[test]
    fn prop_has_tracks_latest_successful_set(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_MAX_ENTRY_SIZE, TEST_CACHE_LIFE);
        let mut events = store.subscribe();
        let mut model: HashMap<String, bool> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Set { encoding, key, size, cache_type } => {
                    let stored = store.set(&encoding, &key, vec![0u8; size], cache_type);
                    if stored {
                        model.insert(full_key(&encoding, &key), true);
                    }
                }
                CacheOp::Get { encoding, key } => {
                    let expected = model.get(&full_key(&encoding, &key)).copied().unwrap_or(false);
                    prop_assert_eq!(store.get(&encoding, &key).is_some(), expected);
                }
                CacheOp::Clear { encoding, key } => {
                    store.clear(encoding.as_deref(), &key);
                }
            }

            // Apply clears and evictions reported by the store
            while let Ok(event) = events.try_recv() {
                if let crate::cache::StoreEvent::Clear { key, encoding, .. } = event {
                    model.insert(full_key(&encoding, &key), false);
                }
            }

            for (fk, present) in &model {
                let (encoding, key) = fk.split_once("::").unwrap();
                prop_assert_eq!(store.has(encoding, key), *present, "mismatch for {}", fk);
            }
        }
    }

    // After any set, evictable bytes stay within budget unless permanent bytes alone exceed it.
    #[test]
    fn prop_size_bound_after_set(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_MAX_ENTRY_SIZE, TEST_CACHE_LIFE);

        for op in ops {
            if let CacheOp::Set { encoding, key, size, cache_type } = op {
                store.set(&encoding, &key, vec![0u8; size], cache_type);
                if store.lru_keys().is_empty() {
                    continue;
                }
                prop_assert!(
                    store.total_size() <= TEST_MAX_SIZE,
                    "total size {} exceeds {} with evictable entries left",
                    store.total_size(),
                    TEST_MAX_SIZE
                );
            }
        }
    }

    // Entries A, B, C set in order, then A read: under pressure B goes first.
    #[test]
    fn prop_lru_access_protects_entry(size in 20usize..=60) {
        let max_size = size * 3;
        let mut store = CacheStore::new(max_size, TEST_MAX_ENTRY_SIZE, TEST_CACHE_LIFE);

        store.set("plain", "a", vec![1u8; size], CacheType::Strong);
        store.set("plain", "b", vec![1u8; size], CacheType::Weak);
        store.set("plain", "c", vec![1u8; size], CacheType::Strong);
        store.get("plain", "a");

        store.set("plain", "d", vec![1u8; size], CacheType::Strong);

        prop_assert!(!store.has("plain", "b"));
        prop_assert!(store.has("plain", "a"));
        prop_assert!(store.has("plain", "c"));
        prop_assert!(store.has("plain", "d"));
    }
}
