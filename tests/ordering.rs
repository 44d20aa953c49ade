use madrona::{BTree, Result, TreeError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::ops::Bound;
use tempfile::tempdir;

fn open_i64(path: &std::path::Path, degree: u32) -> Result<BTree<i64>> {
    BTree::builder(path)
        .degree(degree)
        .key_size_bytes(64)
        .cache_size(8)
        .open()
}

/// Trees built from any permutation of the same multiset store the same
/// in-order sequence.
#[test]
fn insertion_order_does_not_matter() -> Result<()> {
    let dir = tempdir().map_err(TreeError::Io)?;
    let mut multiset: Vec<i64> = (1..=30).chain([7, 7, 19, 19, 19]).collect();
    let mut expected = multiset.clone();
    expected.sort_unstable();

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for round in 0..10 {
        multiset.shuffle(&mut rng);
        let path = dir.path().join(format!("perm{round}.tree"));
        let tree = open_i64(&path, 3)?;
        tree.add(&multiset)?;
        let stored: Vec<i64> = tree.iter().collect::<Result<Vec<_>>>()?;
        assert_eq!(stored, expected, "permutation round {round}");
    }
    Ok(())
}

#[test]
fn range_queries_filter_the_in_order_walk() -> Result<()> {
    let dir = tempdir().map_err(TreeError::Io)?;
    let tree = open_i64(&dir.path().join("range.tree"), 4)?;
    tree.add(&(1..=100).collect::<Vec<_>>())?;

    let mid: Vec<i64> = tree.range(10..=20).collect::<Result<Vec<_>>>()?;
    assert_eq!(mid, (10..=20).collect::<Vec<_>>());

    let head: Vec<i64> = tree.range(..5).collect::<Result<Vec<_>>>()?;
    assert_eq!(head, vec![1, 2, 3, 4]);

    let tail: Vec<i64> = tree.range(95..).collect::<Result<Vec<_>>>()?;
    assert_eq!(tail, (95..=100).collect::<Vec<_>>());

    let exclusive: Vec<i64> = tree
        .range((Bound::Excluded(10), Bound::Excluded(13)))
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(exclusive, vec![11, 12]);

    let empty: Vec<i64> = tree.range(200..).collect::<Result<Vec<_>>>()?;
    assert!(empty.is_empty());
    Ok(())
}

#[test]
fn string_values_round_trip() -> Result<()> {
    let dir = tempdir().map_err(TreeError::Io)?;
    let tree: BTree<String> = BTree::builder(dir.path().join("strings.tree"))
        .degree(3)
        .key_size_bytes(128)
        .cache_size(8)
        .open()?;

    let words = ["pear", "apple", "quince", "fig", "medlar", "apple"];
    tree.add(&words.iter().map(|w| w.to_string()).collect::<Vec<_>>())?;

    let stored: Vec<String> = tree.iter().collect::<Result<Vec<_>>>()?;
    assert_eq!(stored, ["apple", "apple", "fig", "medlar", "pear", "quince"]);
    assert_eq!(tree.find(&"fig".to_string())?, Some("fig".to_string()));
    assert!(tree.find(&"plum".to_string())?.is_none());
    assert_eq!(tree.delete(&["apple".to_string()])?, 2);
    let remaining: Vec<String> = tree.iter().collect::<Result<Vec<_>>>()?;
    assert_eq!(remaining, ["fig", "medlar", "pear", "quince"]);
    Ok(())
}
