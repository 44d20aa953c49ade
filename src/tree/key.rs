use crate::datum::Datum;
use crate::tree::node_ref::NodeRef;

/// One value slot inside a node: the value itself, the two child links that
/// bracket it, and the deletion mark.
///
/// Adjacent keys share their middle subtree: `keys[i].right` and
/// `keys[i + 1].left` are the same handle. Leaf keys carry no links. Key is a
/// passive cell; the ordering and splitting logic lives in
/// [`Node`](crate::tree::node::Node).
#[derive(Clone)]
pub(crate) struct Key<T: Datum> {
    value: T,
    left: Option<NodeRef<T>>,
    right: Option<NodeRef<T>>,
    deleted: bool,
}

impl<T: Datum> Key<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            value,
            left: None,
            right: None,
            deleted: false,
        }
    }

    pub(crate) fn value(&self) -> &T {
        &self.value
    }

    pub(crate) fn left(&self) -> Option<&NodeRef<T>> {
        self.left.as_ref()
    }

    pub(crate) fn right(&self) -> Option<&NodeRef<T>> {
        self.right.as_ref()
    }

    pub(crate) fn set_left(&mut self, child: Option<NodeRef<T>>) {
        self.left = child;
    }

    pub(crate) fn set_right(&mut self, child: Option<NodeRef<T>>) {
        self.right = child;
    }

    pub(crate) fn has_child(&self) -> bool {
        self.left.is_some() || self.right.is_some()
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }
}
