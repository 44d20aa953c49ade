use madrona::{BTree, Result, TreeError};
use tempfile::tempdir;

#[test]
fn reopen_round_trip() -> Result<()> {
    let dir = tempdir().map_err(TreeError::Io)?;
    let path = dir.path().join("roundtrip.tree");

    {
        let tree: BTree<i64> = BTree::builder(&path)
            .degree(3)
            .key_size_bytes(64)
            .cache_size(8)
            .open()?;
        tree.add(&(1..=50).collect::<Vec<_>>())?;
    }

    let tree: BTree<i64> = BTree::builder(&path)
        .degree(3)
        .key_size_bytes(64)
        .cache_size(8)
        .open()?;
    let values: Vec<i64> = tree.iter().collect::<Result<Vec<_>>>()?;
    assert_eq!(values, (1..=50).collect::<Vec<_>>());
    assert_eq!(tree.find(&37)?, Some(37));
    assert!(tree.find(&51)?.is_none());
    Ok(())
}

#[test]
fn metadata_overrides_builder_degree() -> Result<()> {
    let dir = tempdir().map_err(TreeError::Io)?;
    let path = dir.path().join("override.tree");

    {
        let tree: BTree<i64> = BTree::builder(&path)
            .degree(3)
            .key_size_bytes(64)
            .open()?;
        tree.add(&[1, 2, 3])?;
    }

    // the builder asks for degree 9 but the existing metadata wins
    let tree: BTree<i64> = BTree::builder(&path)
        .degree(9)
        .key_size_bytes(64)
        .open()?;
    assert_eq!(tree.degree(), 3);
    let values: Vec<i64> = tree.iter().collect::<Result<Vec<_>>>()?;
    assert_eq!(values, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn delete_marks_survive_reopen() -> Result<()> {
    let dir = tempdir().map_err(TreeError::Io)?;
    let path = dir.path().join("marks.tree");

    {
        let tree: BTree<i64> = BTree::builder(&path)
            .degree(4)
            .key_size_bytes(64)
            .open()?;
        tree.add(&(1..=10).collect::<Vec<_>>())?;
        assert_eq!(tree.delete(&[5])?, 1);
    }

    let tree: BTree<i64> = BTree::builder(&path)
        .degree(4)
        .key_size_bytes(64)
        .open()?;
    assert!(tree.find(&5)?.is_none());
    let values: Vec<i64> = tree.iter().collect::<Result<Vec<_>>>()?;
    assert_eq!(values, vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);
    Ok(())
}

#[test]
fn storage_rolls_to_numbered_files() -> Result<()> {
    let dir = tempdir().map_err(TreeError::Io)?;
    let path = dir.path().join("segments.tree");

    {
        let tree: BTree<i64> = BTree::builder(&path)
            .degree(3)
            .key_size_bytes(64)
            .cache_size(8)
            // tiny segments so a handful of inserts spans several files
            .segment_bytes(1024)
            .open()?;
        tree.add(&(1..=60).collect::<Vec<_>>())?;
    }

    let mut rolled = path.as_os_str().to_owned();
    rolled.push(".1");
    assert!(
        std::path::Path::new(&rolled).exists(),
        "expected at least one rolled storage file"
    );

    let tree: BTree<i64> = BTree::builder(&path)
        .degree(3)
        .key_size_bytes(64)
        .cache_size(8)
        .segment_bytes(1024)
        .open()?;
    let values: Vec<i64> = tree.iter().collect::<Result<Vec<_>>>()?;
    assert_eq!(values, (1..=60).collect::<Vec<_>>());
    for value in [1, 30, 60] {
        assert_eq!(tree.find(&value)?, Some(value));
    }
    Ok(())
}

#[test]
fn reopen_after_eviction_pressure_reads_same_results() -> Result<()> {
    let dir = tempdir().map_err(TreeError::Io)?;
    let path = dir.path().join("evict.tree");

    let expected: Vec<i64> = (1..=200).collect();
    {
        let tree: BTree<i64> = BTree::builder(&path)
            .degree(3)
            .key_size_bytes(64)
            .cache_size(2)
            .open()?;
        tree.add(&expected)?;
        // eviction pressure while the tree is live
        let live: Vec<i64> = tree.iter().collect::<Result<Vec<_>>>()?;
        assert_eq!(live, expected);
        assert!(tree.stats_snapshot().cache_evictions > 0);
    }

    let tree: BTree<i64> = BTree::builder(&path)
        .degree(3)
        .key_size_bytes(64)
        .cache_size(2)
        .open()?;
    let values: Vec<i64> = tree.iter().collect::<Result<Vec<_>>>()?;
    assert_eq!(values, expected);
    Ok(())
}
