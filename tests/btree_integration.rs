//! Integration tests for the B+ tree file.
//!
//! These tests drive the public API end to end: splits, merges, error
//! reporting, and persistence across reopen.

use std::collections::HashSet;

use seqsetdb::{BTreeFile, Error, Rbn, Record, TreeConfig};
use tempfile::tempdir;

/// Order 4 over 256-byte blocks: a leaf holds five zip records and is
/// underfilled with two.
fn small_config() -> TreeConfig {
    TreeConfig::default()
        .with_block_size(256)
        .with_minimum_block_capacity(120)
        .with_order(4)
        .with_sync_on_flush(false)
}

fn create_tree(config: TreeConfig) -> (BTreeFile, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zips.dat");
    (BTreeFile::create(&path, config).unwrap(), dir)
}

/// 45 bytes encoded: `43<zip>,Minneapolis,MN,Hennepin,44.97,-93.22,`
fn zip(key: i64) -> Record {
    let line = format!("{},Minneapolis,MN,Hennepin,44.97,-93.22", key);
    Record::parse_csv(&line, 0).unwrap()
}

fn all_keys(tree: &BTreeFile) -> Vec<i64> {
    tree.iter().map(|r| r.unwrap().key()).collect()
}

// ============================================================================
// Splits
// ============================================================================

/// Insert one at a time until the root splits into an index node over two
/// leaves with disjoint, contiguous key ranges.
#[test]
fn test_root_split_scenario() {
    let (mut tree, _dir) = create_tree(small_config());
    let keys = [55414, 55408, 55417, 55401, 55421, 55403, 55499, 55390];

    let mut inserted = Vec::new();
    for k in keys {
        tree.insert(zip(k)).unwrap();
        inserted.push(k);
        if tree.height().unwrap() == 1 {
            break;
        }
    }
    assert_eq!(tree.height().unwrap(), 1, "root never split");

    let root = tree.find_leaf(keys[0]).unwrap();
    let parent = tree.find_parent(&root).unwrap().unwrap();
    assert_eq!(parent.rbn(), Rbn::ROOT);

    let index = parent.as_index().unwrap();
    assert_eq!(index.keys().len(), 1);
    assert_eq!(index.children().len(), 2);
    let separator = index.keys()[0];

    let left = tree.find_leaf(separator).unwrap();
    let right = tree.find_leaf(separator + 1).unwrap();
    assert_ne!(left.rbn(), right.rbn());
    assert_eq!(left.largest_key(), Some(separator));

    let left_keys: Vec<i64> = left.as_leaf().unwrap().records().iter().map(|r| r.key()).collect();
    let right_keys: Vec<i64> = right.as_leaf().unwrap().records().iter().map(|r| r.key()).collect();
    assert!(left_keys.iter().all(|&k| k <= separator));
    assert!(right_keys.iter().all(|&k| k > separator));
    assert_eq!(left.as_leaf().unwrap().next(), Some(right.rbn()));
    assert_eq!(right.as_leaf().unwrap().prev(), Some(left.rbn()));

    let mut expected = inserted.clone();
    expected.sort_unstable();
    let mut joined = left_keys;
    joined.extend(right_keys);
    assert_eq!(joined, expected);

    tree.verify().unwrap();
}

#[test]
fn test_many_random_inserts() {
    let (mut tree, _dir) = create_tree(small_config());

    // deterministic shuffle of 0..500
    let keys: Vec<i64> = (0..500).map(|i| (i * 7919) % 500).collect();
    for &k in &keys {
        tree.insert(zip(k)).unwrap();
    }

    assert_eq!(tree.record_count(), 500);
    assert_eq!(all_keys(&tree), (0..500).collect::<Vec<_>>());
    for k in [0, 1, 250, 498, 499] {
        assert_eq!(tree.search(k).unwrap().key(), k);
    }
    let summary = tree.verify().unwrap();
    assert!(summary.height >= 2);
    assert_eq!(summary.records, 500);
}

// ============================================================================
// Merges
// ============================================================================

/// Delete until two sibling leaves fall below the minimum capacity; they
/// merge, the vacated block leaves the sequence set, and the parent loses
/// one separator.
#[test]
fn test_merge_scenario() {
    let (mut tree, _dir) = create_tree(small_config());
    for k in 1..=18 {
        tree.insert(zip(k)).unwrap();
    }

    let leaf = tree.find_leaf(1).unwrap();
    let parent_before = tree.find_parent(&leaf).unwrap().unwrap();
    let separators_before = parent_before.as_index().unwrap().keys().len();
    let sibling_rbn = leaf.as_leaf().unwrap().next().unwrap();
    let first_separator = parent_before.as_index().unwrap().keys()[0];
    let sibling = tree.find_leaf(first_separator + 1).unwrap();
    assert_eq!(sibling.rbn(), sibling_rbn);

    // empty both leaves down to below the threshold (two records each)
    let left_keys: Vec<i64> = leaf.as_leaf().unwrap().records().iter().map(|r| r.key()).collect();
    let right_keys: Vec<i64> = sibling.as_leaf().unwrap().records().iter().map(|r| r.key()).collect();
    for &k in &right_keys[2..] {
        tree.remove(k).unwrap();
    }
    for &k in &left_keys[2..] {
        tree.remove(k).unwrap();
    }

    let leaf_after = tree.find_leaf(left_keys[0]).unwrap();
    assert_eq!(leaf_after.rbn(), leaf.rbn());
    let parent_after = tree.find_parent(&leaf_after).unwrap().unwrap();
    assert_eq!(parent_after.rbn(), parent_before.rbn());
    assert_eq!(
        parent_after.as_index().unwrap().keys().len(),
        separators_before - 1
    );

    let reachable: HashSet<Rbn> = tree.leaves().map(|n| n.unwrap().rbn()).collect();
    assert!(!reachable.contains(&sibling_rbn));
    assert!(tree.free_blocks().unwrap().contains(&sibling_rbn));

    let mut survivors = vec![left_keys[0], left_keys[1], right_keys[0], right_keys[1]];
    survivors.sort_unstable();
    assert_eq!(
        leaf_after.as_leaf().unwrap().records().iter().map(|r| r.key()).collect::<Vec<_>>(),
        survivors
    );
    tree.verify().unwrap();
}

/// Block numbers grow from one to two to three digits while full leaves
/// get relinked to new neighbours; every leaf must still fit its block.
#[test]
fn test_relinking_never_overfills_a_leaf() {
    let (mut tree, _dir) = create_tree(small_config());
    let record = |k: i64| {
        let filler = "v".repeat(1 + (k as usize * 13) % 60);
        Record::from_fields([k.to_string(), filler], 0).unwrap()
    };

    let keys: Vec<i64> = (0..900).map(|i| (i * 7919) % 900).collect();
    for &k in &keys {
        if let Err(e) = tree.insert(record(k)) {
            panic!("insert {} failed: {}", k, e);
        }
    }
    assert!(tree.header().block_count > 100);

    for k in (0..900).filter(|k| k % 2 == 1) {
        tree.remove(k).unwrap();
    }
    for k in (0..900).filter(|k| k % 2 == 1).rev() {
        tree.insert(record(k)).unwrap();
    }

    for leaf in tree.leaves() {
        let leaf = leaf.unwrap();
        assert!(leaf.as_leaf().unwrap().encode().unwrap().len() <= 256);
    }
    assert_eq!(all_keys(&tree), (0..900).collect::<Vec<_>>());
    tree.verify().unwrap();
}

#[test]
fn test_delete_everything_in_random_order() {
    let (mut tree, _dir) = create_tree(small_config());
    let keys: Vec<i64> = (0..300).map(|i| (i * 7919) % 300).collect();
    for &k in &keys {
        tree.insert(zip(k)).unwrap();
    }

    for (n, &k) in keys.iter().rev().enumerate() {
        assert_eq!(tree.remove(k).unwrap().key(), k);
        if n % 25 == 0 {
            tree.verify().unwrap();
        }
    }

    assert!(tree.is_empty());
    assert_eq!(tree.height().unwrap(), 0);
    assert!(all_keys(&tree).is_empty());
    tree.verify().unwrap();
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_search_not_found() {
    let (mut tree, _dir) = create_tree(small_config());
    for k in [55414, 55408, 55417] {
        tree.insert(zip(k)).unwrap();
    }

    assert!(matches!(tree.search(12345), Err(Error::KeyNotFound(12345))));

    tree.remove(55408).unwrap();
    let err = tree.search(55408).unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(tree.remove(55408), Err(Error::KeyNotFound(55408))));
}

#[test]
fn test_reinsert_after_delete() {
    let (mut tree, _dir) = create_tree(small_config());
    tree.insert(zip(55414)).unwrap();
    assert!(matches!(
        tree.insert(zip(55414)),
        Err(Error::DuplicateKey(55414))
    ));

    tree.remove(55414).unwrap();
    tree.insert(zip(55414)).unwrap();
    assert_eq!(tree.record_count(), 1);
}

/// A record too large for a solitary leaf is refused before any block
/// is touched.
#[test]
fn test_capacity_rejected_before_mutation() {
    let config = TreeConfig::default()
        .with_block_size(120)
        .with_minimum_block_capacity(40)
        .with_order(3)
        .with_sync_on_flush(false);
    let (mut tree, _dir) = create_tree(config);
    tree.insert(Record::parse_csv("1,small", 0).unwrap()).unwrap();

    let before = tree.stats().snapshot();
    let big = Record::from_fields(["2".to_string(), "x".repeat(93)], 0).unwrap();
    assert!(big.body_len() <= 99);

    let err = tree.insert(big).unwrap_err();
    assert!(matches!(err, Error::Capacity { max: 120, .. }));
    assert_eq!(tree.stats().snapshot(), before);
    assert_eq!(tree.record_count(), 1);

    // over the length prefix limit
    let huge = Record::from_fields(["3".to_string(), "y".repeat(120)], 0).unwrap();
    assert!(matches!(tree.insert(huge), Err(Error::Capacity { max: 99, .. })));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_reopen_preserves_tree() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zips.dat");

    let keys: Vec<i64> = (0..200).map(|i| (i * 37) % 200).collect();
    let (dump_before, free_before) = {
        let mut tree = BTreeFile::create(&path, small_config()).unwrap();
        for &k in &keys {
            tree.insert(zip(k)).unwrap();
        }
        for k in (0..200).filter(|k| k % 3 == 0) {
            tree.remove(k).unwrap();
        }

        let mut dump = Vec::new();
        tree.dump_tree(&mut dump).unwrap();
        let free = tree.free_blocks().unwrap();
        tree.close().unwrap();
        (dump, free)
    };

    let tree = BTreeFile::open(&path, small_config()).unwrap();
    assert!(!tree.header().stale);

    let expected: Vec<i64> = (0..200).filter(|k| k % 3 != 0).collect();
    assert_eq!(tree.record_count(), expected.len() as u64);
    assert_eq!(all_keys(&tree), expected);
    for &k in &expected {
        assert_eq!(tree.search(k).unwrap().key(), k);
    }
    assert!(tree.search(3).is_err());

    let mut dump_after = Vec::new();
    tree.dump_tree(&mut dump_after).unwrap();
    assert_eq!(dump_after, dump_before);
    assert_eq!(tree.free_blocks().unwrap(), free_before);
    tree.verify().unwrap();
}

#[test]
fn test_drop_flushes_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zips.dat");

    {
        let mut tree = BTreeFile::create(&path, small_config()).unwrap();
        tree.insert(zip(1)).unwrap();
        tree.insert(zip(2)).unwrap();
    }

    let tree = BTreeFile::open(&path, small_config()).unwrap();
    assert!(!tree.header().stale);
    assert_eq!(tree.record_count(), 2);
}

#[test]
fn test_free_blocks_reused_after_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zips.dat");

    let high_water = {
        let mut tree = BTreeFile::create(&path, small_config()).unwrap();
        for k in 0..60 {
            tree.insert(zip(k)).unwrap();
        }
        for k in 0..40 {
            tree.remove(k).unwrap();
        }
        assert!(!tree.free_blocks().unwrap().is_empty());
        let count = tree.header().block_count;
        tree.close().unwrap();
        count
    };

    let mut tree = BTreeFile::open(&path, small_config()).unwrap();
    let free = tree.free_blocks().unwrap().len();
    for k in 0..40 {
        tree.insert(zip(k)).unwrap();
    }

    // freed blocks are handed out before the file grows
    let remaining = tree.free_blocks().unwrap().len();
    assert!(remaining < free);
    assert!(tree.header().block_count == high_water || remaining == 0);
    tree.verify().unwrap();
}

/// An insert that fails part way leaves the file marked stale, even after
/// a later successful operation and a clean close.
#[test]
fn test_aborted_insert_leaves_file_stale() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zips.dat");
    let config = TreeConfig::default()
        .with_block_size(120)
        .with_minimum_block_capacity(40)
        .with_order(3)
        .with_sync_on_flush(false);
    let wide = |key: i64, filler: usize| {
        Record::from_fields([key.to_string(), "w".repeat(filler)], 0).unwrap()
    };

    {
        let mut tree = BTreeFile::create(&path, config.clone()).unwrap();
        tree.insert(wide(1, 43)).unwrap();
        tree.insert(wide(3, 43)).unwrap();
        assert!(matches!(
            tree.insert(wide(2, 55)),
            Err(Error::InvariantViolation(_))
        ));
        tree.remove(3).unwrap();
        tree.close().unwrap();
    }

    let tree = BTreeFile::open(&path, config).unwrap();
    assert!(tree.header().stale);
    assert!(!tree.is_aborted());
    assert_eq!(tree.record_count(), 1);
    assert_eq!(tree.header().block_count, 1);
}

#[test]
fn test_key_field_other_than_first() {
    let config = small_config().with_record_format("State,Zip,City", 2);
    let (mut tree, _dir) = create_tree(config);

    for (state, zip_code, city) in [("MN", 55414, "Minneapolis"), ("NY", 501, "Holtsville")] {
        let line = format!("{},{},{}", state, zip_code, city);
        tree.insert(Record::parse_csv(&line, 1).unwrap()).unwrap();
    }

    assert_eq!(tree.search(501).unwrap().field(0), Some("NY"));
    assert_eq!(tree.layout().key_field, 1);
}

#[test]
fn test_display_sequence_set_lists_every_leaf() {
    let (mut tree, _dir) = create_tree(small_config());
    for k in 1..=30 {
        tree.insert(zip(k)).unwrap();
    }

    let mut out = Vec::new();
    tree.display_sequence_set(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    let listed = text.matches("RELATIVE BLOCK NUMBER: ").count();
    assert_eq!(listed, tree.leaves().count());
    assert!(text.contains("4010,Minneapolis,MN,Hennepin,44.97,-93.22,"));
}
