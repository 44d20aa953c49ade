use madrona::{BTree, Result, TreeError};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

const READER_THREADS: usize = 4;
const READER_PASSES: usize = 20;

/// Values present both before and after the writer's inserts must be
/// observed by every reader pass, and no pass may crash or yield garbage.
#[test]
fn readers_observe_stable_values_during_writes() -> Result<()> {
    let dir = tempdir().map_err(TreeError::Io)?;
    let path = dir.path().join("concurrent.tree");

    let tree: Arc<BTree<i64>> = Arc::new(
        BTree::builder(&path)
            .degree(4)
            .key_size_bytes(64)
            .cache_size(16)
            .open()?,
    );

    // evens are present before any reader starts; the writer adds odds
    let stable: Vec<i64> = (1..=100).map(|n| n * 2).collect();
    tree.add(&stable)?;

    let barrier = Arc::new(Barrier::new(READER_THREADS + 1));
    let mut handles = Vec::new();

    for _ in 0..READER_THREADS {
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        let stable = stable.clone();
        handles.push(thread::spawn(move || -> Result<()> {
            barrier.wait();
            for _ in 0..READER_PASSES {
                let seen: Vec<i64> = tree.iter().collect::<Result<Vec<_>>>()?;
                assert!(
                    seen.windows(2).all(|pair| pair[0] <= pair[1]),
                    "iteration must stay non-decreasing"
                );
                for value in &stable {
                    assert_eq!(tree.find(value)?, Some(*value));
                }
                let evens: Vec<i64> = seen.iter().copied().filter(|v| v % 2 == 0).collect();
                assert_eq!(evens, stable, "stable values must all be visible");
            }
            Ok(())
        }));
    }

    let writer = {
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || -> Result<()> {
            barrier.wait();
            for value in (1..=199).step_by(2) {
                tree.add(&[value])?;
            }
            Ok(())
        })
    };

    for handle in handles {
        handle.join().expect("reader thread")?;
    }
    writer.join().expect("writer thread")?;

    let final_values: Vec<i64> = tree.iter().collect::<Result<Vec<_>>>()?;
    let expected: Vec<i64> = {
        let mut all: Vec<i64> = stable.iter().copied().chain((1..=199).step_by(2)).collect();
        all.sort_unstable();
        all
    };
    assert_eq!(final_values, expected);
    Ok(())
}

/// Adds from several threads serialize through the writer monitor and
/// nothing is lost.
#[test]
fn writers_serialize_through_the_monitor() -> Result<()> {
    let dir = tempdir().map_err(TreeError::Io)?;
    let path = dir.path().join("writers.tree");

    let tree: Arc<BTree<i64>> = Arc::new(
        BTree::builder(&path)
            .degree(3)
            .key_size_bytes(64)
            .cache_size(16)
            .open()?,
    );

    let threads = 4;
    let per_thread = 50;
    let barrier = Arc::new(Barrier::new(threads));
    let mut handles = Vec::new();
    for thread_id in 0..threads {
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<()> {
            barrier.wait();
            for i in 0..per_thread {
                tree.add(&[(thread_id * per_thread + i) as i64])?;
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread")?;
    }

    let values: Vec<i64> = tree.iter().collect::<Result<Vec<_>>>()?;
    assert_eq!(
        values,
        (0..(threads * per_thread) as i64).collect::<Vec<_>>()
    );
    Ok(())
}
