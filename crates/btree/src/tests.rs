use super::*;
use proptest::prelude::*;

fn rid(n: u32) -> RecordId {
    RecordId(n)
}

#[test]
fn empty_tree_finds_nothing() {
    let tree = BPlusTree::new(4);
    assert!(tree.search(&Value::Int(1)).is_empty());
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.node_count(), 1);
    assert!(tree.is_empty());
}

#[test]
fn insert_and_search_across_splits() {
    let mut tree = BPlusTree::new(4);
    for i in 0..100 {
        tree.insert(Value::Int(i), rid(i as u32));
    }

    for i in 0..100 {
        assert_eq!(tree.search(&Value::Int(i)), vec![rid(i as u32)], "key {i}");
    }
    assert!(tree.search(&Value::Int(100)).is_empty());
    assert!(tree.height() > 1);
    assert_eq!(tree.len(), 100);
}

#[test]
fn reverse_insertion_stays_sorted() {
    let mut tree = BPlusTree::new(4);
    for i in (0..200).rev() {
        tree.insert(Value::Int(i), rid(i as u32));
    }

    assert!(tree.leaves_are_sorted());
    let keys: Vec<_> = tree.entries().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys.len(), 200);
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(key, &Value::Int(i as i64));
    }
}

#[test]
fn duplicate_keys_are_kept() {
    let mut tree = BPlusTree::new(4);
    for slot in 0..10 {
        tree.insert(Value::Int(42), rid(slot));
    }
    tree.insert(Value::Int(41), rid(100));
    tree.insert(Value::Int(43), rid(101));

    let hits = tree.search(&Value::Int(42));
    assert_eq!(hits.len(), 10);
    assert!(tree.leaves_are_sorted());
}

#[test]
fn duplicates_survive_splits_at_boundaries() {
    // Enough duplicates to force them across adjacent leaves.
    let mut tree = BPlusTree::new(3);
    for i in 0..20 {
        tree.insert(Value::Int(5), rid(i));
    }
    for i in 0..20 {
        tree.insert(Value::Int(i as i64 * 10), rid(1000 + i));
    }

    assert_eq!(tree.search(&Value::Int(5)).len(), 20);
}

#[test]
fn closed_range_scan() {
    let mut tree = BPlusTree::new(4);
    for i in 0..50 {
        tree.insert(Value::Int(i), rid(i as u32));
    }

    let hits = tree.range(Bound::Included(&Value::Int(10)), Bound::Included(&Value::Int(20)));
    assert_eq!(hits.len(), 11);
    assert_eq!(hits[0], rid(10));
    assert_eq!(hits[10], rid(20));
}

#[test]
fn open_bounds_exclude_endpoints() {
    let mut tree = BPlusTree::new(4);
    for i in 0..10 {
        tree.insert(Value::Int(i), rid(i as u32));
    }

    let hits = tree.range(Bound::Excluded(&Value::Int(3)), Bound::Excluded(&Value::Int(7)));
    assert_eq!(hits, vec![rid(4), rid(5), rid(6)]);

    let tail = tree.range(Bound::Excluded(&Value::Int(7)), Bound::Unbounded);
    assert_eq!(tail, vec![rid(8), rid(9)]);
}

#[test]
fn double_keys_widen_against_int_bounds() {
    let mut tree = BPlusTree::new(4);
    tree.insert(Value::Double(4.5), rid(1));
    tree.insert(Value::Double(5.0), rid(2));
    tree.insert(Value::Double(5.5), rid(3));

    let hits = tree.range(Bound::Included(&Value::Int(5)), Bound::Unbounded);
    assert_eq!(hits, vec![rid(2), rid(3)]);
}

#[test]
fn text_keys_scan_lexicographically() {
    let mut tree = BPlusTree::new(4);
    for (i, name) in ["ada", "brian", "carol", "dan"].iter().enumerate() {
        tree.insert(Value::Text(name.to_string()), rid(i as u32));
    }

    let hits = tree.range(
        Bound::Included(&Value::Text("b".into())),
        Bound::Excluded(&Value::Text("d".into())),
    );
    assert_eq!(hits, vec![rid(1), rid(2)]);

    // Numeric bound against text keys matches nothing.
    assert!(tree
        .range(Bound::Included(&Value::Int(0)), Bound::Included(&Value::Int(9)))
        .is_empty());
}

#[test]
fn remove_erases_one_pair() {
    let mut tree = BPlusTree::new(4);
    tree.insert(Value::Int(1), rid(10));
    tree.insert(Value::Int(1), rid(11));

    assert!(tree.remove(&Value::Int(1), rid(10)));
    assert_eq!(tree.search(&Value::Int(1)), vec![rid(11)]);
    assert!(!tree.remove(&Value::Int(1), rid(10)));
    assert!(!tree.remove(&Value::Int(2), rid(11)));
    assert_eq!(tree.len(), 1);
}

#[test]
fn scans_stay_correct_after_heavy_removal() {
    let mut tree = BPlusTree::new(4);
    for i in 0..100 {
        tree.insert(Value::Int(i), rid(i as u32));
    }
    for i in 0..100 {
        if i % 2 == 0 {
            assert!(tree.remove(&Value::Int(i), rid(i as u32)));
        }
    }

    let survivors = tree.range(Bound::Unbounded, Bound::Unbounded);
    assert_eq!(survivors.len(), 50);
    assert!(tree.leaves_are_sorted());
    for r in survivors {
        assert_eq!(r.0 % 2, 1);
    }
}

#[test]
fn clear_resets_to_a_single_leaf() {
    let mut tree = BPlusTree::new(4);
    for i in 0..50 {
        tree.insert(Value::Int(i), rid(i as u32));
    }
    tree.clear();

    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.height(), 1);
    assert!(tree.search(&Value::Int(10)).is_empty());
}

proptest! {
    // An in-order leaf walk yields non-decreasing keys and exactly the
    // live pairs, for any interleaving of inserts and removes.
    #[test]
    fn leaf_walk_matches_live_inserts(ops in proptest::collection::vec((0i64..50, any::<bool>()), 1..300)) {
        let mut tree = BPlusTree::new(4);
        let mut live: Vec<(i64, u32)> = Vec::new();

        for (seq, (key, is_insert)) in ops.into_iter().enumerate() {
            if is_insert {
                tree.insert(Value::Int(key), rid(seq as u32));
                live.push((key, seq as u32));
            } else if let Some(pos) = live.iter().position(|(k, _)| *k == key) {
                let (_, victim) = live.remove(pos);
                prop_assert!(tree.remove(&Value::Int(key), rid(victim)));
            }
        }

        prop_assert!(tree.leaves_are_sorted());
        prop_assert_eq!(tree.len(), live.len());

        let mut expected: Vec<(i64, u32)> = live;
        expected.sort();
        let mut walked: Vec<(i64, u32)> = tree
            .entries()
            .into_iter()
            .map(|(k, r)| match k {
                Value::Int(v) => (v, r.0),
                other => panic!("unexpected key {other:?}"),
            })
            .collect();
        walked.sort();
        prop_assert_eq!(walked, expected);
    }

    // Range scans agree with a naive filter over all entries.
    #[test]
    fn range_matches_naive_filter(keys in proptest::collection::vec(0i64..100, 1..200), lo in 0i64..100, hi in 0i64..100) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let mut tree = BPlusTree::new(5);
        for (i, k) in keys.iter().enumerate() {
            tree.insert(Value::Int(*k), rid(i as u32));
        }

        let got = tree.range(Bound::Included(&Value::Int(lo)), Bound::Included(&Value::Int(hi)));
        let mut expected: Vec<u32> = keys
            .iter()
            .enumerate()
            .filter(|(_, k)| **k >= lo && **k <= hi)
            .map(|(i, _)| i as u32)
            .collect();
        let mut got: Vec<u32> = got.into_iter().map(|r| r.0).collect();
        got.sort();
        expected.sort();
        prop_assert_eq!(got, expected);
    }
}
