//! Node data model: a bounded, ordered run of keys plus the split algorithm.

use std::collections::VecDeque;

use crate::datum::Datum;
use crate::tree::key::Key;
use crate::tree::node_ref::NodeRef;

/// A bounded run of keys, non-decreasing under `<` with stable duplicate
/// order. A stable node holds at most `degree - 1` keys; `degree` keys is the
/// transient overflow state that triggers a split and is never observable
/// after an insert returns.
pub(crate) struct Node<T: Datum> {
    keys: Vec<Key<T>>,
    degree: u32,
    is_root: bool,
}

/// Insertion bundle threaded through the recursive descent.
///
/// On the way down `key` is the value being inserted; on the way back up it
/// is the separator promoted by a child split, or `None` when the child
/// absorbed the insert. `save_queue` accumulates every freshly-created or
/// mutated node child-first so the flush can assign positions in one pass
/// with parents serialized after their children.
pub(crate) struct KeyNodes<T: Datum> {
    pub(crate) key: Option<Key<T>>,
    pub(crate) save_queue: VecDeque<NodeRef<T>>,
}

impl<T: Datum> KeyNodes<T> {
    pub(crate) fn new(key: Key<T>) -> Self {
        Self {
            key: Some(key),
            save_queue: VecDeque::new(),
        }
    }
}

/// Outcome of one step of a point lookup.
pub(crate) enum SearchStep<T: Datum> {
    Found(T),
    Absent,
    Descend(NodeRef<T>),
}

/// One element of an in-order traversal frame.
#[derive(Clone)]
pub(crate) enum IterStep<T: Datum> {
    Child(NodeRef<T>),
    Value(T),
}

/// Children to descend into and local matches for one delete step.
pub(crate) struct DeletePlan<T: Datum> {
    pub(crate) children: Vec<NodeRef<T>>,
    pub(crate) local_matches: u64,
}

impl<T: Datum> Node<T> {
    pub(crate) fn empty(degree: u32, is_root: bool) -> Self {
        Self {
            keys: Vec::new(),
            degree,
            is_root,
        }
    }

    pub(crate) fn from_keys(keys: Vec<Key<T>>, degree: u32, is_root: bool) -> Self {
        Self {
            keys,
            degree,
            is_root,
        }
    }

    pub(crate) fn keys(&self) -> &[Key<T>] {
        &self.keys
    }

    pub(crate) fn degree(&self) -> u32 {
        self.degree
    }

    pub(crate) fn is_root(&self) -> bool {
        self.is_root
    }

    /// A node is a leaf when it has no children; checking the first key
    /// suffices because children are all-or-none.
    pub(crate) fn is_leaf(&self) -> bool {
        self.keys.first().map_or(true, |key| !key.has_child())
    }

    pub(crate) fn is_overfull(&self) -> bool {
        self.keys.len() as u32 >= self.degree
    }

    /// Splice `key` into the run in sorted position, equal values after the
    /// existing ones. The spliced key's children take precedence: the
    /// neighbours on either side adopt them as their facing links, which also
    /// unlinks a child that was just replaced by a split.
    pub(crate) fn splice(&mut self, key: Key<T>) {
        let idx = self
            .keys
            .iter()
            .position(|existing| key.value() < existing.value())
            .unwrap_or(self.keys.len());
        self.keys.insert(idx, key);
        if idx > 0 {
            let left = self.keys[idx].left().cloned();
            self.keys[idx - 1].set_right(left);
        }
        if idx + 1 < self.keys.len() {
            let right = self.keys[idx].right().cloned();
            self.keys[idx + 1].set_left(right);
        }
    }

    /// Split an overfull run at the lower median. Keys `[0, m)` are copied
    /// into a fresh left child, keys `[m + 1, k)` into a fresh right child,
    /// and key `m` is returned as the separator with the two children as its
    /// links. This node keeps its content: its identity is retired once the
    /// parent adopts the separator, but concurrent readers holding the old
    /// handle continue to see the pre-split run. The slot it occupied on
    /// disk becomes garbage.
    pub(crate) fn split(&self) -> (Key<T>, NodeRef<T>, NodeRef<T>) {
        debug_assert!(self.is_overfull());
        let median = (self.keys.len() - 1) / 2;
        let left_keys = self.keys[..median].to_vec();
        let right_keys = self.keys[median + 1..].to_vec();
        let mut separator = self.keys[median].clone();
        let left = NodeRef::fresh(Node::from_keys(left_keys, self.degree, false));
        let right = NodeRef::fresh(Node::from_keys(right_keys, self.degree, false));
        separator.set_left(Some(left.clone()));
        separator.set_right(Some(right.clone()));
        (separator, left, right)
    }

    /// Child to descend into when inserting `value`: left of the first
    /// strictly greater key, otherwise the last key's right. Equal values go
    /// right. `None` on a leaf.
    pub(crate) fn descend_target(&self, value: &T) -> Option<NodeRef<T>> {
        for key in &self.keys {
            if key.value() > value {
                return key.left().cloned();
            }
        }
        self.keys.last().and_then(|key| key.right().cloned())
    }

    /// One lookup step. A promoted separator is the only copy of its value,
    /// so equality matches here as well as in leaves.
    pub(crate) fn search_step(&self, target: &T) -> SearchStep<T> {
        for key in &self.keys {
            if !key.is_deleted() && key.value() == target {
                return SearchStep::Found(key.value().clone());
            }
            if key.value() > target {
                return match key.left() {
                    Some(child) => SearchStep::Descend(child.clone()),
                    None => SearchStep::Absent,
                };
            }
        }
        match self.keys.last().and_then(|key| key.right()) {
            Some(child) => SearchStep::Descend(child.clone()),
            None => SearchStep::Absent,
        }
    }

    /// Children whose key range admits `target`, plus the count of local
    /// non-deleted matches. Duplicates may sit on either side of an equal
    /// separator after a split, so every admitting child is visited.
    pub(crate) fn delete_plan(&self, target: &T) -> DeletePlan<T> {
        let mut children = Vec::new();
        if !self.is_leaf() {
            let count = self.keys.len();
            for slot in 0..=count {
                let lower_ok = slot == 0 || self.keys[slot - 1].value() <= target;
                let upper_ok = slot == count || self.keys[slot].value() >= target;
                if !lower_ok || !upper_ok {
                    continue;
                }
                let child = if slot == 0 {
                    self.keys[0].left()
                } else {
                    self.keys[slot - 1].right()
                };
                if let Some(child) = child {
                    children.push(child.clone());
                }
            }
        }
        let local_matches = self
            .keys
            .iter()
            .filter(|key| !key.is_deleted() && key.value() == target)
            .count() as u64;
        DeletePlan {
            children,
            local_matches,
        }
    }

    /// Mark every non-deleted key equal to `target` and return how many were
    /// marked.
    pub(crate) fn mark_matches(&mut self, target: &T) -> u64 {
        let mut count = 0;
        for key in &mut self.keys {
            if !key.is_deleted() && key.value() == target {
                key.set_deleted(true);
                count += 1;
            }
        }
        count
    }

    /// Snapshot this node as an in-order traversal frame. Deleted keys are
    /// skipped but their subtrees are still descended.
    pub(crate) fn iter_steps(&self) -> Vec<IterStep<T>> {
        let mut steps = Vec::new();
        if let Some(first) = self.keys.first() {
            if let Some(child) = first.left() {
                steps.push(IterStep::Child(child.clone()));
            }
        }
        for key in &self.keys {
            if !key.is_deleted() {
                steps.push(IterStep::Value(key.value().clone()));
            }
            if let Some(child) = key.right() {
                steps.push(IterStep::Child(child.clone()));
            }
        }
        steps
    }
}
