// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the open-addressed hash table.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;

use proptest::prelude::*;

use super::*;
use crate::heap::{GcRoots, Heap};
use crate::value::{Value, hash_string};

/// Intern a batch of distinct keys for table tests.
fn intern_keys(heap: &mut Heap, count: usize) -> Vec<ObjRef> {
    (0..count)
        .map(|i| heap.copy_string(&format!("key{i}"), &GcRoots::default()))
        .collect()
}

fn key_hash(heap: &Heap, key: ObjRef) -> u32 {
    heap.string(key).hash
}

#[test]
fn get_on_empty_table() {
    let mut heap = Heap::new();
    let keys = intern_keys(&mut heap, 1);

    let table = Table::new();
    assert_eq!(table.get(keys[0], key_hash(&heap, keys[0])), None);
    assert!(table.is_empty());
}

#[test]
fn set_and_get() {
    let mut heap = Heap::new();
    let keys = intern_keys(&mut heap, 2);
    let mut table = Table::new();

    assert!(table.set(keys[0], key_hash(&heap, keys[0]), Value::Number(1.0)));
    assert!(table.set(keys[1], key_hash(&heap, keys[1]), Value::Number(2.0)));

    assert_eq!(
        table.get(keys[0], key_hash(&heap, keys[0])),
        Some(Value::Number(1.0))
    );
    assert_eq!(
        table.get(keys[1], key_hash(&heap, keys[1])),
        Some(Value::Number(2.0))
    );
    assert_eq!(table.len(), 2);
}

#[test]
fn set_overwrites_and_reports_existing_key() {
    let mut heap = Heap::new();
    let keys = intern_keys(&mut heap, 1);
    let hash = key_hash(&heap, keys[0]);
    let mut table = Table::new();

    assert!(table.set(keys[0], hash, Value::Number(1.0)));
    assert!(!table.set(keys[0], hash, Value::Number(2.0)));
    assert_eq!(table.get(keys[0], hash), Some(Value::Number(2.0)));
    assert_eq!(table.len(), 1);
}

#[test]
fn delete_leaves_a_tombstone_that_probing_skips() {
    let mut heap = Heap::new();
    let keys = intern_keys(&mut heap, 16);
    let mut table = Table::new();

    for &key in &keys {
        table.set(key, key_hash(&heap, key), Value::Bool(true));
    }

    // Delete half, the rest must remain reachable through tombstones.
    for &key in keys.iter().step_by(2) {
        assert!(table.delete(key, key_hash(&heap, key)));
    }
    for &key in keys.iter().skip(1).step_by(2) {
        assert_eq!(table.get(key, key_hash(&heap, key)), Some(Value::Bool(true)));
    }
    for &key in keys.iter().step_by(2) {
        assert_eq!(table.get(key, key_hash(&heap, key)), None);
        assert!(!table.delete(key, key_hash(&heap, key)));
    }
}

#[test]
fn reinsert_after_delete_reuses_the_tombstone() {
    let mut heap = Heap::new();
    let keys = intern_keys(&mut heap, 1);
    let hash = key_hash(&heap, keys[0]);
    let mut table = Table::new();

    table.set(keys[0], hash, Value::Number(1.0));
    table.delete(keys[0], hash);
    assert!(table.set(keys[0], hash, Value::Number(2.0)));
    assert_eq!(table.get(keys[0], hash), Some(Value::Number(2.0)));
    assert_eq!(table.len(), 1);
}

#[test]
fn growth_preserves_entries() {
    let mut heap = Heap::new();
    let keys = intern_keys(&mut heap, 100);
    let mut table = Table::new();

    for (i, &key) in keys.iter().enumerate() {
        table.set(key, key_hash(&heap, key), Value::Number(i as f64));
    }

    assert_eq!(table.len(), 100);
    for (i, &key) in keys.iter().enumerate() {
        assert_eq!(
            table.get(key, key_hash(&heap, key)),
            Some(Value::Number(i as f64))
        );
    }
}

#[test]
fn add_all_copies_occupied_entries() {
    let mut heap = Heap::new();
    let keys = intern_keys(&mut heap, 8);
    let mut src = Table::new();
    let mut dst = Table::new();

    for (i, &key) in keys.iter().enumerate() {
        src.set(key, key_hash(&heap, key), Value::Number(i as f64));
    }
    src.delete(keys[0], key_hash(&heap, keys[0]));

    dst.add_all(&src);
    assert_eq!(dst.len(), 7);
    assert_eq!(dst.get(keys[0], key_hash(&heap, keys[0])), None);
    assert_eq!(
        dst.get(keys[3], key_hash(&heap, keys[3])),
        Some(Value::Number(3.0))
    );
}

#[test]
fn find_string_matches_by_content() {
    let mut heap = Heap::new();
    let key = heap.copy_string("needle", &GcRoots::default());

    // The intern set is itself a table keyed by the string.
    let found = heap
        .strings()
        .find_string(heap.store(), "needle", hash_string("needle"));
    assert_eq!(found, Some(key));

    let missing = heap
        .strings()
        .find_string(heap.store(), "missing", hash_string("missing"));
    assert_eq!(missing, None);
}

#[test]
fn iter_visits_only_occupied_entries() {
    let mut heap = Heap::new();
    let keys = intern_keys(&mut heap, 4);
    let mut table = Table::new();

    for &key in &keys {
        table.set(key, key_hash(&heap, key), Value::Nil);
    }
    table.delete(keys[1], key_hash(&heap, keys[1]));

    let visited: Vec<_> = table.iter().map(|(key, _)| key).collect();
    assert_eq!(visited.len(), 3);
    assert!(!visited.contains(&keys[1]));
}

proptest! {
    /// The table behaves like a model map under arbitrary interleavings
    /// of set/delete/get over a fixed key universe.
    #[test]
    fn behaves_like_a_model_map(ops in prop::collection::vec((0usize..24, -100i64..100, prop::bool::ANY), 0..400)) {
        let mut heap = Heap::new();
        let keys = intern_keys(&mut heap, 24);

        let mut table = Table::new();
        let mut model: HashMap<usize, f64> = HashMap::new();

        for (index, value, is_set) in ops {
            let key = keys[index];
            let hash = key_hash(&heap, key);
            if is_set {
                let value = value as f64;
                let was_new = table.set(key, hash, Value::Number(value));
                prop_assert_eq!(was_new, model.insert(index, value).is_none());
            } else {
                let existed = table.delete(key, hash);
                prop_assert_eq!(existed, model.remove(&index).is_some());
            }

            for (i, &k) in keys.iter().enumerate() {
                let expected = model.get(&i).map(|&v| Value::Number(v));
                prop_assert_eq!(table.get(k, key_hash(&heap, k)), expected);
            }
        }

        prop_assert_eq!(table.len(), model.len());
    }
}
