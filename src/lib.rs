#![forbid(unsafe_code)]

//! madrona — a persistent, on-disk B-tree storing an ordered multiset of
//! comparable, serializable values.
//!
//! The tree supports insertion, point lookup and in-order iteration, with
//! deletion as a marking operation. Nodes live in fixed-size storage slots
//! and are loaded lazily through shared handles; a bounded LRU cache unloads
//! cold nodes. A single writer runs at a time behind an internal monitor
//! while readers proceed without it under a documented weak-consistency
//! contract. Mutated nodes are rewritten at fresh positions and the
//! metadata file is the single commit point, so a crash mid-flush leaves a
//! consistent tree rooted at the previous root.
//!
//! ```no_run
//! use madrona::BTree;
//!
//! # fn main() -> madrona::Result<()> {
//! let tree: BTree<i64> = BTree::builder("/tmp/example.tree")
//!     .degree(100)
//!     .key_size_bytes(64)
//!     .cache_size(1000)
//!     .open()?;
//! tree.add(&[3, 1, 2])?;
//! assert_eq!(tree.find(&2)?, Some(2));
//! let values: Vec<i64> = tree.iter().collect::<madrona::Result<_>>()?;
//! assert_eq!(values, vec![1, 2, 3]);
//! # Ok(())
//! # }
//! ```

pub mod datum;
pub mod error;
pub mod stats;
pub mod tree;
pub mod types;

mod cache;
mod storage;

pub use crate::datum::Datum;
pub use crate::error::{Result, TreeError};
pub use crate::stats::{TreeStats, TreeStatsSnapshot};
pub use crate::tree::{BTree, Builder, RangeIter, TreeIter};
pub use crate::types::Position;
