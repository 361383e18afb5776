use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use parking_lot::lock_api::RawMutex as _;
use parking_lot::{Mutex, RawMutex};

/// Key space of the main list. Two sentinels bound every traversal so a
/// lookup always has a predecessor below it and a terminator above it.
///
/// The derived ordering gives `Head < Item(_) < Tail`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ListKey<K> {
    Head,
    Item(K),
    Tail,
}

impl<K: Ord> ListKey<K> {
    /// True when this key sorts strictly before the caller-supplied `key`.
    pub(crate) fn precedes(&self, key: &K) -> bool {
        match self {
            ListKey::Head => true,
            ListKey::Item(k) => k < key,
            ListKey::Tail => false,
        }
    }

    /// True when this key is exactly the caller-supplied `key`.
    pub(crate) fn matches(&self, key: &K) -> bool {
        match self {
            ListKey::Item(k) => k == key,
            _ => false,
        }
    }
}

/// Lifecycle of a node's entry in the fast-lookup index.
///
/// Index deltas are applied outside the commit critical section, so a
/// node's insert delta can arrive after its remove delta. The slot state,
/// guarded by a per-node mutex, keeps a retired node from ever re-entering
/// the index and guarantees the node is handed to the collector exactly
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexSlot {
    /// Created; insert delta not applied yet.
    Pending,
    /// Present in the index.
    Linked,
    /// Remove delta applied; must never re-enter the index.
    Retired,
}

/// A single element of the main sorted list.
///
/// `key` and `value` never change after construction. `next`, `deleted`
/// and `version` change only inside the locked apply phase of a successful
/// commit. The lock is taken exclusively at commit time; ordinary reads
/// observe it and route around or abort instead of blocking.
pub(crate) struct Node<K, V> {
    pub(crate) key: ListKey<K>,
    pub(crate) value: Option<V>,
    pub(crate) next: Atomic<Node<K, V>>,
    pub(crate) deleted: AtomicBool,
    pub(crate) version: AtomicU64,
    lock: RawMutex,
    pub(crate) index_slot: Mutex<IndexSlot>,
}

impl<K, V> Node<K, V> {
    pub(crate) fn new(key: K, value: V, version: u64) -> Self {
        Self {
            key: ListKey::Item(key),
            value: Some(value),
            next: Atomic::null(),
            deleted: AtomicBool::new(false),
            version: AtomicU64::new(version),
            lock: RawMutex::INIT,
            index_slot: Mutex::new(IndexSlot::Pending),
        }
    }

    pub(crate) fn sentinel(key: ListKey<K>) -> Self {
        Self {
            key,
            value: None,
            next: Atomic::null(),
            deleted: AtomicBool::new(false),
            version: AtomicU64::new(0),
            lock: RawMutex::INIT,
            index_slot: Mutex::new(IndexSlot::Pending),
        }
    }

    /// Loads the current successor. `None` only on the tail sentinel.
    pub(crate) fn successor(&self, guard: &Guard) -> Option<NodeRef<K, V>> {
        NodeRef::from_shared(self.next.load(Ordering::SeqCst, guard))
    }

    pub(crate) fn store_next(&self, next: Option<NodeRef<K, V>>) {
        match next {
            Some(n) => self.next.store(n.shared(), Ordering::SeqCst),
            None => self.next.store(Shared::null(), Ordering::SeqCst),
        }
    }

    pub(crate) fn try_lock(&self) -> bool {
        self.lock.try_lock()
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Releases the commit lock.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock via a prior successful `try_lock`.
    pub(crate) unsafe fn unlock(&self) {
        unsafe { self.lock.unlock() }
    }
}

/// Copyable shared handle to a node.
///
/// Node identity is its address: handles hash and compare by pointer, which
/// is what keys the write set. Dereferencing is safe for any holder whose
/// transaction keeps its epoch guard pinned, because retirement of an
/// unlinked node is deferred past every guard pinned at unlink time.
pub(crate) struct NodeRef<K, V> {
    ptr: NonNull<Node<K, V>>,
}

impl<K, V> NodeRef<K, V> {
    /// Moves a node onto the shared heap and returns its handle.
    pub(crate) fn alloc(node: Node<K, V>) -> Self {
        let shared = Owned::new(node).into_shared(unsafe { epoch::unprotected() });
        Self {
            ptr: unsafe { NonNull::new_unchecked(shared.as_raw() as *mut Node<K, V>) },
        }
    }

    pub(crate) fn from_shared(shared: Shared<'_, Node<K, V>>) -> Option<Self> {
        if shared.is_null() {
            None
        } else {
            Some(Self {
                ptr: unsafe { NonNull::new_unchecked(shared.as_raw() as *mut Node<K, V>) },
            })
        }
    }

    pub(crate) fn shared<'g>(&self) -> Shared<'g, Node<K, V>> {
        Shared::from(self.ptr.as_ptr() as *const Node<K, V>)
    }

    pub(crate) fn get(&self) -> &Node<K, V> {
        // Holders only reach a node through a pinned snapshot; see the
        // type-level comment.
        unsafe { self.ptr.as_ref() }
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }

    /// Frees the node immediately.
    ///
    /// # Safety
    ///
    /// The node must be unreachable by every other thread: either it was
    /// never published, or the structure is being torn down.
    pub(crate) unsafe fn reclaim(self) {
        drop(unsafe { self.shared().into_owned() });
    }
}

impl<K, V> Clone for NodeRef<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for NodeRef<K, V> {}

impl<K, V> PartialEq for NodeRef<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<K, V> Eq for NodeRef<K, V> {}

impl<K, V> Hash for NodeRef<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.ptr.as_ptr() as usize);
    }
}

unsafe impl<K: Send + Sync, V: Send + Sync> Send for NodeRef<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for NodeRef<K, V> {}

/// Owner of the main list chain.
///
/// Transactions hold a reference to the spine so the chain outlives every
/// pinned snapshot; the last holder frees whatever is still linked. Nodes
/// unlinked by committed removes are not on the chain anymore and are
/// reclaimed through the epoch collector instead.
pub(crate) struct ListSpine<K, V> {
    head: NodeRef<K, V>,
}

impl<K, V> ListSpine<K, V> {
    pub(crate) fn new() -> Self {
        let tail = NodeRef::alloc(Node::sentinel(ListKey::Tail));
        let head = NodeRef::alloc(Node::sentinel(ListKey::Head));
        head.get().store_next(Some(tail));
        Self { head }
    }

    pub(crate) fn head(&self) -> NodeRef<K, V> {
        self.head
    }
}

impl<K, V> Drop for ListSpine<K, V> {
    fn drop(&mut self) {
        let guard = unsafe { epoch::unprotected() };
        let mut cur = Some(self.head);
        while let Some(node) = cur {
            cur = node.get().successor(guard);
            unsafe { node.reclaim() };
        }
    }
}

unsafe impl<K: Send + Sync, V: Send + Sync> Send for ListSpine<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for ListSpine<K, V> {}
