//! Lazy node handles.
//!
//! A `NodeRef` pairs a storage [`Position`] with an optionally-resident
//! [`Node`]. Handles are shared (`Arc`) so that a parent's key links, the
//! cache, and the tree's root slot all observe the same position and
//! resident state; the cache unloads the resident node on eviction and the
//! next dereference reloads it from storage.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::datum::Datum;
use crate::error::{Result, TreeError};
use crate::tree::node::{KeyNodes, Node};
use crate::tree::TreeInner;
use crate::types::Position;

pub(crate) struct NodeRef<T: Datum> {
    inner: Arc<RefInner<T>>,
}

struct RefInner<T: Datum> {
    degree: u32,
    is_root: AtomicBool,
    position: RwLock<Option<Position>>,
    resident: RwLock<Option<Node<T>>>,
}

impl<T: Datum> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Datum> NodeRef<T> {
    /// Handle for a freshly built node that has never been saved.
    pub(crate) fn fresh(node: Node<T>) -> Self {
        Self {
            inner: Arc::new(RefInner {
                degree: node.degree(),
                is_root: AtomicBool::new(node.is_root()),
                position: RwLock::new(None),
                resident: RwLock::new(Some(node)),
            }),
        }
    }

    /// Handle for a persisted node that has not been loaded yet.
    pub(crate) fn unresolved(position: Position, degree: u32, is_root: bool) -> Self {
        Self {
            inner: Arc::new(RefInner {
                degree,
                is_root: AtomicBool::new(is_root),
                position: RwLock::new(Some(position)),
                resident: RwLock::new(None),
            }),
        }
    }

    pub(crate) fn position(&self) -> Option<Position> {
        *self.inner.position.read()
    }

    pub(crate) fn set_position(&self, position: Position) {
        *self.inner.position.write() = Some(position);
    }

    pub(crate) fn is_root(&self) -> bool {
        self.inner.is_root.load(AtomicOrdering::Acquire)
    }

    /// Stable identity of this handle, used by the flush to track
    /// freshly-allocated positions before they are published.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Drop the resident node. Driven by cache eviction; the handle stays
    /// valid and reloads on the next dereference.
    pub(crate) fn unload(&self) {
        *self.inner.resident.write() = None;
    }

    /// Run `f` against the resident node, loading it first if needed.
    pub(crate) fn with_node<R>(
        &self,
        tree: &TreeInner<T>,
        f: impl FnOnce(&Node<T>) -> Result<R>,
    ) -> Result<R> {
        if let Some(position) = self.position() {
            tree.cache_touch(&position);
        }
        {
            let guard = self.inner.resident.read();
            if let Some(node) = guard.as_ref() {
                return f(node);
            }
        }
        // Build outside the resident lock: loading resolves child links
        // through the cache, and the cache must never wait on a resident
        // lock held by a loader.
        let built = self.build_resident(tree)?;
        let result = {
            let mut guard = self.inner.resident.write();
            if guard.is_none() {
                *guard = Some(built);
            }
            match guard.as_ref() {
                Some(node) => f(node),
                None => Err(TreeError::Corruption(
                    "resident node vanished during load".into(),
                )),
            }
        };
        if let Some(position) = self.position() {
            tree.cache_note_resident(&position, self);
        }
        result
    }

    /// Run `f` against the resident node mutably. Writer-only.
    pub(crate) fn with_node_mut<R>(
        &self,
        tree: &TreeInner<T>,
        f: impl FnOnce(&mut Node<T>) -> Result<R>,
    ) -> Result<R> {
        if let Some(position) = self.position() {
            tree.cache_touch(&position);
        }
        let mut guard = self.inner.resident.write();
        if guard.is_none() {
            // build outside the lock; see `with_node`
            drop(guard);
            let built = self.build_resident(tree)?;
            guard = self.inner.resident.write();
            if guard.is_none() {
                *guard = Some(built);
            }
        }
        let result = match guard.as_mut() {
            Some(node) => f(node),
            None => Err(TreeError::Corruption(
                "resident node vanished during load".into(),
            )),
        };
        drop(guard);
        if let Some(position) = self.position() {
            tree.cache_note_resident(&position, self);
        }
        result
    }

    /// Run `f` against an already-resident node. Used by the flush path,
    /// where every queued node was just created or mutated in memory.
    pub(crate) fn with_resident<R>(&self, f: impl FnOnce(&Node<T>) -> Result<R>) -> Result<R> {
        match self.inner.resident.read().as_ref() {
            Some(node) => f(node),
            None => Err(TreeError::Corruption(
                "save queue node is not resident".into(),
            )),
        }
    }

    fn build_resident(&self, tree: &TreeInner<T>) -> Result<Node<T>> {
        match self.position() {
            Some(position) => {
                tree.stats().inc_node_loads();
                tracing::trace!(
                    target: "madrona::storage",
                    position = %position,
                    "loading node"
                );
                let node = tree.load_node(position)?;
                self.inner
                    .is_root
                    .store(node.is_root(), AtomicOrdering::Release);
                Ok(node)
            }
            None => Ok(Node::empty(self.inner.degree, self.is_root())),
        }
    }

    /// Recursive insert: locate the leaf, splice, and unwind splits upward
    /// through the returned bundle.
    pub(crate) fn add(&self, bundle: KeyNodes<T>, tree: &TreeInner<T>) -> Result<KeyNodes<T>> {
        let descend = {
            let pending = bundle.key.as_ref().ok_or_else(|| {
                TreeError::Corruption("insert bundle carries no pending key".into())
            })?;
            self.with_node(tree, |node| {
                if node.is_leaf() {
                    Ok(None)
                } else {
                    node.descend_target(pending.value()).map(Some).ok_or_else(|| {
                        TreeError::Corruption("internal node without child links".into())
                    })
                }
            })?
        };
        match descend {
            None => self.insert_local(bundle, tree),
            Some(child) => {
                let bundle = child.add(bundle, tree)?;
                if bundle.key.is_some() {
                    // child split; splice the promoted separator here
                    self.insert_local(bundle, tree)
                } else {
                    let mut bundle = bundle;
                    bundle.save_queue.push_back(self.clone());
                    Ok(bundle)
                }
            }
        }
    }

    /// Splice the bundle's pending key into this node and split on overflow.
    fn insert_local(&self, mut bundle: KeyNodes<T>, tree: &TreeInner<T>) -> Result<KeyNodes<T>> {
        let key = bundle
            .key
            .take()
            .ok_or_else(|| TreeError::Corruption("insert bundle carries no pending key".into()))?;
        let split = self.with_node_mut(tree, |node| {
            node.splice(key);
            if node.is_overfull() {
                Ok(Some(node.split()))
            } else {
                Ok(None)
            }
        })?;
        match split {
            None => {
                bundle.save_queue.push_back(self.clone());
            }
            Some((separator, left, right)) => {
                tree.stats().inc_splits();
                tracing::trace!(
                    target: "madrona::split",
                    root = self.is_root(),
                    "split overfull node"
                );
                bundle.save_queue.push_back(left);
                bundle.save_queue.push_back(right);
                bundle.key = Some(separator);
            }
        }
        Ok(bundle)
    }

    /// Recursive delete-by-marking. Dirtied nodes are queued child-first so
    /// ancestors re-serialize with their children's new positions.
    pub(crate) fn delete(
        &self,
        target: &T,
        queue: &mut VecDeque<NodeRef<T>>,
        tree: &TreeInner<T>,
    ) -> Result<u64> {
        let plan = self.with_node(tree, |node| Ok(node.delete_plan(target)))?;
        let mut count = 0;
        let mut dirty = false;
        for child in plan.children {
            let before = queue.len();
            count += child.delete(target, queue, tree)?;
            if queue.len() > before {
                dirty = true;
            }
        }
        if plan.local_matches > 0 {
            count += self.with_node_mut(tree, |node| Ok(node.mark_matches(target)))?;
            dirty = true;
        }
        if dirty {
            queue.push_back(self.clone());
        }
        Ok(count)
    }
}
