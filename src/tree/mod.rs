//! The tree coordinator: root handle, writer serialization, flush queue and
//! the public builder surface.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::ops::{Bound, RangeBounds};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cache::NodeCache;
use crate::datum::Datum;
use crate::error::{Result, TreeError};
use crate::stats::{TreeStats, TreeStatsSnapshot};
use crate::storage::{self, Storage};
use crate::types::{
    Position, DEFAULT_CACHE_SIZE, DEFAULT_DEGREE, DEFAULT_KEY_SIZE_BYTES, DEFAULT_SEGMENT_BYTES,
};

pub(crate) mod key;
pub(crate) mod node;
pub(crate) mod node_ref;


use key::Key;
use node::{IterStep, KeyNodes, Node, SearchStep};
use node_ref::NodeRef;

/// A persistent, on-disk B-tree storing an ordered multiset of values.
///
/// One mutating operation runs at a time behind an internal writer monitor;
/// lookups and iteration take no monitor and observe the root as of each
/// top-level call. An iterator begun before an insert may include or exclude
/// the new value — the documented weak-consistency contract.
pub struct BTree<T: Datum> {
    inner: Arc<TreeInner<T>>,
}

pub(crate) struct TreeInner<T: Datum> {
    storage: Storage,
    cache: Option<NodeCache<T>>,
    stats: Arc<TreeStats>,
    degree: u32,
    root: RwLock<NodeRef<T>>,
    write_monitor: Mutex<()>,
}

impl<T: Datum> TreeInner<T> {
    pub(crate) fn stats(&self) -> &TreeStats {
        &self.stats
    }

    pub(crate) fn cache_touch(&self, position: &Position) {
        if let Some(cache) = &self.cache {
            cache.touch(position);
        }
    }

    pub(crate) fn cache_note_resident(&self, position: &Position, handle: &NodeRef<T>) {
        if let Some(cache) = &self.cache {
            cache.insert(*position, handle.clone());
        }
    }

    /// Unique handle for a persisted child. With a cache engaged all parents
    /// referring to `position` share one handle; without one, handles are
    /// fresh per link and nothing is ever unloaded.
    pub(crate) fn resolve_child(&self, position: Position) -> NodeRef<T> {
        match &self.cache {
            Some(cache) => {
                cache.resolve(position, || NodeRef::unresolved(position, self.degree, false))
            }
            None => NodeRef::unresolved(position, self.degree, false),
        }
    }

    pub(crate) fn load_node(&self, position: Position) -> Result<Node<T>> {
        self.storage
            .load(position, self.degree, &|child| self.resolve_child(child))
    }

    fn flush(&self, queue: &mut VecDeque<NodeRef<T>>) -> Result<()> {
        let saved = self.storage.save(queue)?;
        self.stats.add_node_saves(saved.len() as u64);
        if let Some(cache) = &self.cache {
            for handle in &saved {
                if let Some(position) = handle.position() {
                    cache.insert(position, handle.clone());
                }
            }
        }
        Ok(())
    }

    fn write_metadata(&self) -> Result<()> {
        let root = self.root.read().clone();
        let position = root.position().ok_or_else(|| {
            TreeError::Corruption("root has no assigned position after flush".into())
        })?;
        self.storage.write_metadata(&storage::Metadata {
            storage_file_number: self.storage.current_file_number(),
            root: position,
            degree: self.degree,
        })
    }

    #[cfg(test)]
    pub(crate) fn cache_len(&self) -> Option<usize> {
        self.cache.as_ref().map(|cache| cache.len())
    }
}

impl<T: Datum> BTree<T> {
    /// Start building a tree persisted under `path`.
    pub fn builder(path: impl Into<PathBuf>) -> Builder<T> {
        Builder::new(path)
    }

    /// The maximum number of keys in a node plus one.
    pub fn degree(&self) -> u32 {
        self.inner.degree
    }

    /// Insert every value in order. Each value is one serialized write
    /// cycle: descend, splice, unwind splits, flush, commit metadata.
    pub fn add(&self, values: &[T]) -> Result<&Self> {
        for value in values {
            self.add_one(value.clone())?;
        }
        Ok(self)
    }

    fn add_one(&self, value: T) -> Result<()> {
        let _write = self.inner.write_monitor.lock();
        self.inner.stats.inc_inserts();
        let root = self.inner.root.read().clone();
        let mut bundle = root.add(KeyNodes::new(Key::new(value)), &self.inner)?;
        let new_root = match bundle.key.take() {
            Some(separator) => {
                // the root itself split; promote a fresh one-key root
                let mut node = Node::empty(self.inner.degree, true);
                node.splice(separator);
                let handle = NodeRef::fresh(node);
                bundle.save_queue.push_back(handle.clone());
                tracing::trace!(target: "madrona::split", "promoted new root");
                handle
            }
            None => match bundle.save_queue.back() {
                Some(handle) => handle.clone(),
                None => {
                    return Err(TreeError::Corruption(
                        "insert produced an empty save queue".into(),
                    ))
                }
            },
        };
        self.inner.flush(&mut bundle.save_queue)?;
        *self.inner.root.write() = new_root;
        self.inner.write_metadata()
    }

    /// Point lookup: returns any stored value equal to `value`, or `None`.
    pub fn find(&self, value: &T) -> Result<Option<T>> {
        self.inner.stats.inc_finds();
        let mut current = self.inner.root.read().clone();
        loop {
            let step = current.with_node(&self.inner, |node| Ok(node.search_step(value)))?;
            match step {
                SearchStep::Found(found) => return Ok(Some(found)),
                SearchStep::Absent => return Ok(None),
                SearchStep::Descend(child) => {
                    tracing::trace!(
                        target: "madrona::search",
                        "descending through internal node"
                    );
                    current = child;
                }
            }
        }
    }

    /// Mark every stored value equal to one of `values` as deleted and
    /// return the total count. Structure is untouched; slots holding only
    /// marks are left for a future compaction pass.
    pub fn delete(&self, values: &[T]) -> Result<u64> {
        let mut count = 0;
        for value in values {
            count += self.delete_one(value)?;
        }
        Ok(count)
    }

    fn delete_one(&self, value: &T) -> Result<u64> {
        let _write = self.inner.write_monitor.lock();
        let root = self.inner.root.read().clone();
        let mut queue = VecDeque::new();
        let count = root.delete(value, &mut queue, &self.inner)?;
        if !queue.is_empty() {
            self.inner.flush(&mut queue)?;
            self.inner.write_metadata()?;
        }
        Ok(count)
    }

    /// Lazy in-order iteration over non-deleted values.
    pub fn iter(&self) -> TreeIter<T> {
        TreeIter {
            tree: Arc::clone(&self.inner),
            start: Some(self.inner.root.read().clone()),
            stack: Vec::new(),
            failed: false,
        }
    }

    /// In-order iteration restricted to `bounds`.
    pub fn range(&self, bounds: impl RangeBounds<T>) -> RangeIter<T> {
        RangeIter {
            iter: self.iter(),
            lower: bounds.start_bound().cloned(),
            upper: bounds.end_bound().cloned(),
            done: false,
        }
    }

    /// Capture the current statistics counters.
    pub fn stats_snapshot(&self) -> TreeStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Emit the current statistics to the tracing sink.
    pub fn emit_stats(&self) {
        self.inner.stats.emit_tracing();
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<TreeInner<T>> {
        &self.inner
    }

    #[cfg(test)]
    pub(crate) fn root_handle(&self) -> NodeRef<T> {
        self.inner.root.read().clone()
    }
}

/// Fluent configuration for opening a [`BTree`].
///
/// An existing metadata file overrides `degree` and supplies the root
/// location; `key_size_bytes` must match the value the tree was created
/// with, since the slot width is not part of the metadata frame.
pub struct Builder<T: Datum> {
    path: PathBuf,
    degree: u32,
    key_size_bytes: u32,
    cache_size: usize,
    segment_bytes: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Datum> Builder<T> {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            degree: DEFAULT_DEGREE,
            key_size_bytes: DEFAULT_KEY_SIZE_BYTES,
            cache_size: DEFAULT_CACHE_SIZE,
            segment_bytes: DEFAULT_SEGMENT_BYTES,
            _marker: PhantomData,
        }
    }

    /// Maximum number of keys in a node plus one. Must be at least 2.
    pub fn degree(mut self, degree: u32) -> Self {
        self.degree = degree;
        self
    }

    /// Per-key slot budget in bytes; the node slot is
    /// `degree * key_size_bytes`. Must be positive.
    pub fn key_size_bytes(mut self, key_size_bytes: u32) -> Self {
        self.key_size_bytes = key_size_bytes;
        self
    }

    /// Bound on resident nodes. Zero disables the cache: nodes stay
    /// resident until dropped and nothing is ever unloaded.
    pub fn cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Storage file roll threshold in bytes.
    pub fn segment_bytes(mut self, segment_bytes: u64) -> Self {
        self.segment_bytes = segment_bytes;
        self
    }

    /// Open the tree, adopting an existing one when its metadata file is
    /// present and creating an empty root otherwise.
    pub fn open(self) -> Result<BTree<T>> {
        if self.path.as_os_str().is_empty() {
            return Err(TreeError::Config("base path must not be empty".into()));
        }
        if self.degree < 2 {
            return Err(TreeError::Config(format!(
                "degree must be >= 2, got {}",
                self.degree
            )));
        }
        if self.key_size_bytes == 0 {
            return Err(TreeError::Config("key_size_bytes must be > 0".into()));
        }

        let metadata_path = storage::metadata_path(&self.path);
        let existing = if metadata_path.exists() {
            Some(storage::read_metadata(&metadata_path)?)
        } else {
            None
        };
        let (degree, root_position, file_number) = match &existing {
            Some(metadata) => (metadata.degree, Some(metadata.root), metadata.storage_file_number),
            None => (self.degree, None, 0),
        };

        let slot_bytes = degree as u64 * self.key_size_bytes as u64;
        let storage = Storage::open(self.path.clone(), slot_bytes, self.segment_bytes, file_number)?;
        let stats = Arc::new(TreeStats::default());
        let cache = NonZeroUsize::new(self.cache_size)
            .map(|capacity| NodeCache::new(capacity, Arc::clone(&stats)));
        let root = match root_position {
            Some(position) => NodeRef::unresolved(position, degree, true),
            None => NodeRef::fresh(Node::empty(degree, true)),
        };

        let tree = BTree {
            inner: Arc::new(TreeInner {
                storage,
                cache,
                stats,
                degree,
                root: RwLock::new(root.clone()),
                write_monitor: Mutex::new(()),
            }),
        };
        if existing.is_none() {
            // first flush establishes the empty root, then the metadata
            // write commits it
            let _write = tree.inner.write_monitor.lock();
            let mut queue = VecDeque::from([root]);
            tree.inner.flush(&mut queue)?;
            tree.inner.write_metadata()?;
        }
        tracing::debug!(
            target: "madrona::open",
            path = %self.path.display(),
            degree,
            fresh = existing.is_none(),
            "opened tree"
        );
        Ok(tree)
    }
}

/// Lazy in-order traversal, restartable from the root it captured at
/// creation. Each visited node is snapshotted under a short read lock, so a
/// concurrent writer is never blocked for longer than one node visit.
pub struct TreeIter<T: Datum> {
    tree: Arc<TreeInner<T>>,
    start: Option<NodeRef<T>>,
    stack: Vec<IterFrame<T>>,
    failed: bool,
}

struct IterFrame<T: Datum> {
    steps: Vec<IterStep<T>>,
    next: usize,
}

impl<T: Datum> TreeIter<T> {
    fn push_frame(&mut self, handle: &NodeRef<T>) -> Result<()> {
        let steps = handle.with_node(&self.tree, |node| Ok(node.iter_steps()))?;
        self.stack.push(IterFrame { steps, next: 0 });
        Ok(())
    }
}

impl<T: Datum> Iterator for TreeIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(root) = self.start.take() {
            if let Err(err) = self.push_frame(&root) {
                self.failed = true;
                return Some(Err(err));
            }
        }
        loop {
            let frame = self.stack.last_mut()?;
            if frame.next >= frame.steps.len() {
                self.stack.pop();
                continue;
            }
            let step = frame.steps[frame.next].clone();
            frame.next += 1;
            match step {
                IterStep::Value(value) => return Some(Ok(value)),
                IterStep::Child(child) => {
                    if let Err(err) = self.push_frame(&child) {
                        self.failed = true;
                        return Some(Err(err));
                    }
                }
            }
        }
    }
}

/// [`TreeIter`] restricted to a bound range; terminates at the first value
/// past the upper bound since the traversal is non-decreasing.
pub struct RangeIter<T: Datum> {
    iter: TreeIter<T>,
    lower: Bound<T>,
    upper: Bound<T>,
    done: bool,
}

impl<T: Datum> RangeIter<T> {
    fn below_lower(&self, value: &T) -> bool {
        match &self.lower {
            Bound::Unbounded => false,
            Bound::Included(bound) => value < bound,
            Bound::Excluded(bound) => value <= bound,
        }
    }

    fn past_upper(&self, value: &T) -> bool {
        match &self.upper {
            Bound::Unbounded => false,
            Bound::Included(bound) => value > bound,
            Bound::Excluded(bound) => value >= bound,
        }
    }
}

impl<T: Datum> Iterator for RangeIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.iter.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                Some(Ok(value)) => {
                    if self.below_lower(&value) {
                        continue;
                    }
                    if self.past_upper(&value) {
                        self.done = true;
                        return None;
                    }
                    return Some(Ok(value));
                }
            }
        }
    }
}
