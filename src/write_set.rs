use std::collections::hash_map::Entry;
use std::sync::atomic::Ordering;

use ahash::AHashMap as HashMap;
use crossbeam_epoch::Guard;

use crate::node::NodeRef;

/// A buffered mutation against one node: the successor it should point at
/// after commit and whether it is to be marked deleted.
pub(crate) struct Operation<K, V> {
    next: Option<NodeRef<K, V>>,
    deleted: bool,
}

/// Per-transaction buffer of tentative mutations, keyed by node identity.
///
/// Nothing here touches shared state until [`WriteSet::update`] runs inside
/// the locked apply phase of a commit; an aborted transaction simply drops
/// the buffer.
pub(crate) struct WriteSet<K, V> {
    items: HashMap<NodeRef<K, V>, Operation<K, V>>,
}

impl<K, V> WriteSet<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn contains(&self, node: &NodeRef<K, V>) -> bool {
        self.items.contains_key(node)
    }

    /// Merges a pending mutation. A `Some` next overrides any previously
    /// buffered next; a deletion is sticky for the rest of the transaction.
    pub(crate) fn add_item(
        &mut self,
        node: NodeRef<K, V>,
        next: Option<NodeRef<K, V>>,
        deleted: bool,
    ) {
        match self.items.entry(node) {
            Entry::Vacant(slot) => {
                slot.insert(Operation { next, deleted });
            }
            Entry::Occupied(mut slot) => {
                let op = slot.get_mut();
                if next.is_some() {
                    op.next = next;
                }
                if deleted {
                    op.deleted = true;
                }
            }
        }
    }

    /// Buffered view of `node`, if this transaction staged one: the
    /// effective successor (buffered, falling back to the live link when
    /// nothing was buffered for it) and the buffered deletion flag.
    pub(crate) fn lookup(
        &self,
        node: NodeRef<K, V>,
        guard: &Guard,
    ) -> Option<(Option<NodeRef<K, V>>, bool)> {
        self.items.get(&node).map(|op| {
            let next = match op.next {
                Some(n) => Some(n),
                None => node.get().successor(guard),
            };
            (next, op.deleted)
        })
    }

    /// All-or-nothing lock acquisition over every staged node, in no
    /// particular order. On the first failure the caller releases whatever
    /// landed in `locked` and aborts.
    pub(crate) fn try_lock(&self, locked: &mut Vec<NodeRef<K, V>>) -> bool {
        for node in self.items.keys() {
            if node.get().try_lock() {
                locked.push(*node);
            } else {
                return false;
            }
        }
        true
    }

    /// Applies every buffered mutation and stamps the new version.
    ///
    /// Only called while the caller holds the lock of every staged node.
    pub(crate) fn update(&self, new_version: u64) {
        for (node, op) in &self.items {
            let n = node.get();
            if op.deleted {
                n.deleted.store(true, Ordering::SeqCst);
            }
            if let Some(next) = op.next {
                n.next.store(next.shared(), Ordering::SeqCst);
            }
            n.version.store(new_version, Ordering::SeqCst);
        }
    }
}
