use std::ops::Bound;

use crossbeam_epoch::Guard;
use crossbeam_skiplist::SkipMap;

use crate::node::{IndexSlot, ListKey, NodeRef};

/// The kind of index delta a commit queues for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexOpKind {
    Insert,
    Remove,
}

/// A queued index delta. Deltas accumulate on the transaction and are
/// applied in order once the commit's locked section has closed.
pub(crate) struct IndexOp<K, V> {
    node: NodeRef<K, V>,
    kind: IndexOpKind,
}

impl<K, V> IndexOp<K, V> {
    pub(crate) fn insert(node: NodeRef<K, V>) -> Self {
        Self {
            node,
            kind: IndexOpKind::Insert,
        }
    }

    pub(crate) fn remove(node: NodeRef<K, V>) -> Self {
        Self {
            node,
            kind: IndexOpKind::Remove,
        }
    }
}

/// Approximate fast-lookup structure over a subset of live nodes.
///
/// The index is an accelerator, never ground truth: it is updated after
/// commits complete, so it may briefly miss a just-inserted node or still
/// carry a just-deleted one. Traversal tolerates both. The only hard
/// guarantees are that [`Index::prev_entry`] never fabricates a node that
/// was not a list member and never hands out a node the collector could
/// already have reclaimed.
pub(crate) struct Index<K, V> {
    map: SkipMap<K, NodeRef<K, V>>,
    head: NodeRef<K, V>,
}

impl<K, V> Index<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(head: NodeRef<K, V>) -> Self {
        Self {
            map: SkipMap::new(),
            head,
        }
    }

    /// Best-known entry point strictly before `key`, falling back to the
    /// head sentinel. Strictness is what lets the traversal's walk-back
    /// loop make progress: stepping back from a node always lands on a
    /// strictly smaller key.
    pub(crate) fn prev_entry(&self, key: &K) -> NodeRef<K, V> {
        self.map
            .upper_bound(Bound::Excluded(key))
            .map(|entry| *entry.value())
            .unwrap_or(self.head)
    }

    /// Re-derives an entry point after `from` turned out to be unusable.
    pub(crate) fn step_back(&self, from: &ListKey<K>) -> NodeRef<K, V> {
        match from {
            ListKey::Item(k) => self.prev_entry(k),
            _ => self.head,
        }
    }

    /// Applies a commit's queued deltas, in order.
    pub(crate) fn update(&self, ops: &[IndexOp<K, V>], guard: &Guard) {
        for op in ops {
            match op.kind {
                IndexOpKind::Insert => self.insert(op.node),
                IndexOpKind::Remove => self.remove(op.node, guard),
            }
        }
    }

    /// Admits a node as an entry point, unless its remove delta already
    /// ran. Deltas from different commits apply unordered, so a node's
    /// insert can trail its remove; the slot state closes that window.
    fn insert(&self, node: NodeRef<K, V>) {
        let n = node.get();
        let mut slot = n.index_slot.lock();
        if *slot != IndexSlot::Pending {
            return;
        }
        if let ListKey::Item(k) = &n.key {
            self.map.insert(k.clone(), node);
        }
        *slot = IndexSlot::Linked;
    }

    /// Retires a node from the index and hands it to the collector.
    ///
    /// The map removal is node-precise: a same-key entry that meanwhile
    /// came to point at a different node is left alone. Exactly one remove
    /// delta exists per node, so the deferred destruction runs once, and
    /// only after the entry is unreachable through the map.
    fn remove(&self, node: NodeRef<K, V>, guard: &Guard) {
        let n = node.get();
        {
            let mut slot = n.index_slot.lock();
            if *slot == IndexSlot::Linked {
                if let ListKey::Item(k) = &n.key {
                    if let Some(entry) = self.map.get(k) {
                        if entry.value().ptr_eq(&node) {
                            entry.remove();
                        }
                    }
                }
            }
            *slot = IndexSlot::Retired;
        }
        // Unlinked from the list by the committed splice and now absent
        // from the index; no traversal that pins after this point can
        // reach it.
        unsafe { guard.defer_destroy(node.shared()) };
    }
}
