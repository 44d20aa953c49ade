use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of tree statistics at a point in time.
#[derive(Default, Debug, Clone, Copy)]
pub struct TreeStatsSnapshot {
    /// Number of point lookups served
    pub finds: u64,
    /// Number of values inserted
    pub inserts: u64,
    /// Number of node splits performed
    pub splits: u64,
    /// Number of nodes deserialized from storage
    pub node_loads: u64,
    /// Number of nodes written to storage
    pub node_saves: u64,
    /// Number of resident nodes unloaded by the cache
    pub cache_evictions: u64,
}

/// Thread-safe statistics tracking for tree operations.
#[derive(Default)]
pub struct TreeStats {
    finds: AtomicU64,
    inserts: AtomicU64,
    splits: AtomicU64,
    node_loads: AtomicU64,
    node_saves: AtomicU64,
    cache_evictions: AtomicU64,
}

impl TreeStats {
    pub fn finds(&self) -> u64 {
        self.finds.load(AtomicOrdering::Relaxed)
    }

    pub fn inserts(&self) -> u64 {
        self.inserts.load(AtomicOrdering::Relaxed)
    }

    pub fn splits(&self) -> u64 {
        self.splits.load(AtomicOrdering::Relaxed)
    }

    pub fn node_loads(&self) -> u64 {
        self.node_loads.load(AtomicOrdering::Relaxed)
    }

    pub fn node_saves(&self) -> u64 {
        self.node_saves.load(AtomicOrdering::Relaxed)
    }

    pub fn cache_evictions(&self) -> u64 {
        self.cache_evictions.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_finds(&self) {
        self.finds.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_inserts(&self) {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_splits(&self) {
        self.splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_node_loads(&self) {
        self.node_loads.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn add_node_saves(&self, n: u64) {
        self.node_saves.fetch_add(n, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_cache_evictions(&self) {
        self.cache_evictions.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Capture the current counters.
    pub fn snapshot(&self) -> TreeStatsSnapshot {
        TreeStatsSnapshot {
            finds: self.finds(),
            inserts: self.inserts(),
            splits: self.splits(),
            node_loads: self.node_loads(),
            node_saves: self.node_saves(),
            cache_evictions: self.cache_evictions(),
        }
    }

    /// Emit the current counters to the tracing sink.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::debug!(
            target: "madrona::stats",
            finds = snapshot.finds,
            inserts = snapshot.inserts,
            splits = snapshot.splits,
            node_loads = snapshot.node_loads,
            node_saves = snapshot.node_saves,
            cache_evictions = snapshot.cache_evictions,
            "tree statistics"
        );
    }
}
