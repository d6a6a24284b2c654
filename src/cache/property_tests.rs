//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the versioning and statistics contracts of the
//! in-memory backend against a simple model.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::cache::{CacheBackend, Expiration, MemoryBackend};

// == Strategies ==
/// A small key space so operations collide often.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-d]"
}

fn region_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), Just("Math".to_string())]
}

/// Generates a sequence of backend operations for testing
#[derive(Debug, Clone)]
enum BackendOp {
    Set { key: String, region: String, value: i32 },
    Get { key: String, region: String },
    Remove { key: String, region: String },
    MarkValidated { key: String, region: String },
}

fn backend_op_strategy() -> impl Strategy<Value = BackendOp> {
    prop_oneof![
        (key_strategy(), region_strategy(), any::<i32>())
            .prop_map(|(key, region, value)| BackendOp::Set { key, region, value }),
        (key_strategy(), region_strategy()).prop_map(|(key, region)| BackendOp::Get { key, region }),
        (key_strategy(), region_strategy())
            .prop_map(|(key, region)| BackendOp::Remove { key, region }),
        (key_strategy(), region_strategy())
            .prop_map(|(key, region)| BackendOp::MarkValidated { key, region }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Versions start at 0, grow by exactly 1 per write, survive validation,
    // and restart at 0 after a remove.
    #[test]
    fn prop_versions_follow_model(ops in prop::collection::vec(backend_op_strategy(), 1..60)) {
        let backend = MemoryBackend::new();
        let mut model: HashMap<(String, String), (i32, i64)> = HashMap::new();

        for op in ops {
            match op {
                BackendOp::Set { key, region, value } => {
                    let entry = backend.set(&key, &region, value, &Expiration::never()).unwrap();
                    let expected = model
                        .get(&(key.clone(), region.clone()))
                        .map_or(0, |(_, version)| version + 1);
                    prop_assert_eq!(entry.version, expected);
                    prop_assert!(entry.is_persisted());
                    model.insert((key, region), (value, expected));
                }
                BackendOp::Get { key, region } => {
                    let entry = backend.get::<i32>(&key, &region).unwrap();
                    let expected = model.get(&(key, region)).copied();
                    prop_assert_eq!(entry.map(|e| (e.value, e.version)), expected);
                }
                BackendOp::Remove { key, region } => {
                    backend.remove(&key, &region).unwrap();
                    model.remove(&(key, region));
                }
                BackendOp::MarkValidated { key, region } => {
                    backend.mark_validated(&key, &region).unwrap();
                }
            }
        }

        prop_assert_eq!(backend.len(), model.len());
    }

    // Hits, misses, writes and removals match what the sequence implies.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(backend_op_strategy(), 1..60)) {
        let backend = MemoryBackend::new();
        let mut present: HashSet<(String, String)> = HashSet::new();
        let (mut hits, mut misses, mut writes, mut removals, mut validations) = (0u64, 0u64, 0u64, 0u64, 0u64);

        for op in ops {
            match op {
                BackendOp::Set { key, region, value } => {
                    backend.set(&key, &region, value, &Expiration::never()).unwrap();
                    present.insert((key, region));
                    writes += 1;
                }
                BackendOp::Get { key, region } => {
                    backend.get::<i32>(&key, &region).unwrap();
                    if present.contains(&(key, region)) {
                        hits += 1;
                    } else {
                        misses += 1;
                    }
                }
                BackendOp::Remove { key, region } => {
                    backend.remove(&key, &region).unwrap();
                    if present.remove(&(key, region)) {
                        removals += 1;
                    }
                }
                BackendOp::MarkValidated { key, region } => {
                    backend.mark_validated(&key, &region).unwrap();
                    if present.contains(&(key, region)) {
                        validations += 1;
                    }
                }
            }
        }

        let stats = backend.stats();
        prop_assert_eq!(stats.hits, hits);
        prop_assert_eq!(stats.misses, misses);
        prop_assert_eq!(stats.writes, writes);
        prop_assert_eq!(stats.removals, removals);
        prop_assert_eq!(stats.validations, validations);
        prop_assert_eq!(stats.total_entries, present.len());
    }

    // Removing an absent key never fails and leaves it absent.
    #[test]
    fn prop_remove_is_idempotent(key in key_strategy(), region in region_strategy(), repeats in 1usize..4) {
        let backend = MemoryBackend::new();
        backend.set(&key, &region, 7_i32, &Expiration::never()).unwrap();

        for _ in 0..repeats {
            prop_assert!(backend.remove(&key, &region).is_ok());
        }

        prop_assert!(backend.get::<i32>(&key, &region).unwrap().is_none());
        prop_assert_eq!(backend.stats().removals, 1);
    }
}
