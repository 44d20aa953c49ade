//! Bounded resident set of nodes keyed by storage position.
//!
//! The cache is the uniqueness oracle for node handles: child links are
//! resolved through [`NodeCache::resolve`], so every parent referring to a
//! position shares the same handle. Evicting an entry unloads its resident
//! node; the handle itself stays valid and reloads on the next dereference.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::datum::Datum;
use crate::stats::TreeStats;
use crate::tree::node_ref::NodeRef;
use crate::types::Position;

pub(crate) struct NodeCache<T: Datum> {
    map: Mutex<LruCache<Position, NodeRef<T>>>,
    stats: Arc<TreeStats>,
}

impl<T: Datum> NodeCache<T> {
    pub(crate) fn new(capacity: NonZeroUsize, stats: Arc<TreeStats>) -> Self {
        Self {
            map: Mutex::new(LruCache::new(capacity)),
            stats,
        }
    }

    /// Return the unique handle for `position`, tracking a freshly built one
    /// when nothing is cached for it.
    pub(crate) fn resolve(
        &self,
        position: Position,
        make: impl FnOnce() -> NodeRef<T>,
    ) -> NodeRef<T> {
        let mut evicted = None;
        let handle = {
            let mut map = self.map.lock();
            if let Some(existing) = map.get(&position) {
                existing.clone()
            } else {
                let fresh = make();
                evicted = map.push(position, fresh.clone());
                fresh
            }
        };
        if let Some((stale_pos, stale)) = evicted {
            if stale_pos != position {
                self.evict(stale_pos, stale);
            }
        }
        handle
    }

    /// Track a handle that was just loaded or saved at `position`.
    pub(crate) fn insert(&self, position: Position, handle: NodeRef<T>) {
        let evicted = self.map.lock().push(position, handle);
        if let Some((stale_pos, stale)) = evicted {
            if stale_pos != position {
                self.evict(stale_pos, stale);
            }
        }
    }

    /// Promote an entry to most-recently-used (no-op if missing).
    pub(crate) fn touch(&self, position: &Position) {
        self.map.lock().get(position);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }

    fn evict(&self, position: Position, stale: NodeRef<T>) {
        stale.unload();
        self.stats.inc_cache_evictions();
        tracing::trace!(
            target: "madrona::cache",
            position = %position,
            "evicted resident node"
        );
    }
}
