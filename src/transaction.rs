use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Guard};
use log::debug;

use crate::clock::VersionClock;
use crate::errors::{Result, SeleneError};
use crate::index::{Index, IndexOp};
use crate::node::{ListSpine, Node, NodeRef};
use crate::write_set::WriteSet;

/// A node's successor link as seen by one transaction: the buffered value
/// if the transaction staged one, the live value otherwise.
struct ValidatedLink<K: 'static, V: 'static> {
    next: Option<NodeRef<K, V>>,
    deleted: bool,
}

/// A single transaction over a [`Selene`](crate::Selene) list.
///
/// A transaction runs every operation against the snapshot it took at
/// begin time: reads traverse the live list but abort on anything a later
/// commit has touched, and writes accumulate in a private buffer that only
/// becomes visible if [`Transaction::commit`] succeeds. Aborts surface as
/// [`SeleneError::TransactionConflict`]; the caller discards the
/// transaction and retries with a fresh one.
pub struct Transaction<K: 'static, V: 'static> {
    /// The snapshot version, fixed at begin.
    read_version: u64,
    /// The commit version, assigned if the commit reaches the apply phase.
    write_version: Option<u64>,
    /// Nodes whose successor link this transaction observed and which must
    /// still be unchanged at commit.
    read_set: Vec<NodeRef<K, V>>,
    /// Buffered mutations, applied only inside a successful commit.
    write_set: WriteSet<K, V>,
    /// Index deltas to apply after the commit's locked section closes.
    index_ops: Vec<IndexOp<K, V>>,
    /// Nodes this transaction allocated; reclaimed directly on abort since
    /// they were never published.
    fresh: Vec<NodeRef<K, V>>,
    clock: Arc<VersionClock>,
    index: Arc<Index<K, V>>,
    /// Keeps the node chain alive for the duration of the snapshot.
    _spine: Arc<ListSpine<K, V>>,
    /// Epoch pin taken at begin; everything captured in the read and write
    /// sets stays dereferenceable while it is held.
    guard: Guard,
    committed: bool,
    aborted: bool,
}

impl<K, V> Transaction<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        clock: Arc<VersionClock>,
        index: Arc<Index<K, V>>,
        spine: Arc<ListSpine<K, V>>,
    ) -> Self {
        let guard = epoch::pin();
        let read_version = clock.read();
        Self {
            read_version,
            write_version: None,
            read_set: Vec::new(),
            write_set: WriteSet::new(),
            index_ops: Vec::new(),
            fresh: Vec::new(),
            clock,
            index,
            _spine: spine,
            guard,
            committed: false,
            aborted: false,
        }
    }

    /// The snapshot version this transaction reads at.
    pub fn read_version(&self) -> u64 {
        self.read_version
    }

    /// The commit version, once the transaction has committed.
    pub fn write_version(&self) -> Option<u64> {
        self.write_version
    }

    /// Returns whether `key` is present in this transaction's view.
    pub fn contains(&mut self, key: &K) -> Result<bool> {
        self.fenced(|txn| txn.contains_at(key))
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&mut self, key: &K) -> Result<Option<V>> {
        self.fenced(|txn| txn.get_at(key))
    }

    /// Stages an insert of `key`. Returns `Ok(false)` without staging
    /// anything when the key is already present.
    pub fn insert(&mut self, key: K, value: V) -> Result<bool> {
        self.fenced(|txn| txn.insert_at(key, value))
    }

    /// Stages an upsert of `key`, returning the value it replaces, if any.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        self.fenced(|txn| txn.put_at(key, value))
    }

    /// Stages a removal of `key`. Returns `Ok(false)` when the key is
    /// absent in this transaction's view.
    pub fn remove(&mut self, key: &K) -> Result<bool> {
        self.fenced(|txn| txn.remove_at(key))
    }

    /// Attempts to commit the transaction.
    ///
    /// Locks every staged node (all or nothing), re-validates the read
    /// set against the snapshot, takes a commit version from the clock,
    /// applies the write buffer, releases the locks, and finally applies
    /// the queued index deltas. Any failure before the apply phase
    /// releases whatever was acquired and aborts with no observable
    /// effect.
    pub fn commit(mut self) -> Result<()> {
        if self.aborted {
            return Err(SeleneError::TransactionConflict);
        }

        let mut locked = Vec::with_capacity(self.write_set.len());
        if !self.write_set.try_lock(&mut locked) {
            release_locks(&locked);
            debug!(
                "Transaction at snapshot {} aborted: commit lock contention",
                self.read_version
            );
            return Err(SeleneError::TransactionConflict);
        }

        if let Err(conflict) = self.validate_read_set() {
            release_locks(&locked);
            debug!(
                "Transaction at snapshot {} aborted: read set validation failed",
                self.read_version
            );
            return Err(conflict);
        }

        let write_version = self.clock.advance();
        self.write_version = Some(write_version);
        self.write_set.update(write_version);
        release_locks(&locked);

        // The locked section is closed. The index lags the list until
        // these deltas land, which traversal tolerates by construction.
        self.index.update(&self.index_ops, &self.guard);
        self.committed = true;
        debug!(
            "Transaction at snapshot {} committed at version {}",
            self.read_version, write_version
        );
        Ok(())
    }

    /// Discards the transaction and everything it staged.
    pub fn rollback(self) {
        debug!("Transaction at snapshot {} rolled back", self.read_version);
    }

    /// Runs one operation, refusing to run on (and poisoning after) an
    /// abort, so a half-staged write buffer can never reach commit.
    fn fenced<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.aborted {
            return Err(SeleneError::TransactionConflict);
        }
        let res = op(self);
        if res.is_err() {
            self.aborted = true;
        }
        res
    }

    fn contains_at(&mut self, key: &K) -> Result<bool> {
        let (_pred, succ) = self.traverse_to(key)?;
        Ok(succ.is_some_and(|n| n.get().key.matches(key)))
    }

    fn get_at(&mut self, key: &K) -> Result<Option<V>> {
        let (_pred, succ) = self.traverse_to(key)?;
        match succ {
            Some(n) if n.get().key.matches(key) => Ok(n.get().value.clone()),
            _ => Ok(None),
        }
    }

    fn insert_at(&mut self, key: K, value: V) -> Result<bool> {
        let (pred, succ) = self.traverse_to(&key)?;
        if succ.is_some_and(|n| n.get().key.matches(&key)) {
            return Ok(false);
        }

        let node = NodeRef::alloc(Node::new(key, value, self.read_version));
        node.get().store_next(succ);
        self.fresh.push(node);
        self.write_set.add_item(pred, Some(node), false);
        self.write_set.add_item(node, None, false);
        self.index_ops.push(IndexOp::insert(node));
        Ok(true)
    }

    fn put_at(&mut self, key: K, value: V) -> Result<Option<V>> {
        let (pred, succ) = self.traverse_to(&key)?;
        let matched = succ.filter(|n| n.get().key.matches(&key));

        let node = NodeRef::alloc(Node::new(key, value, self.read_version));
        self.fresh.push(node);

        let previous = match matched {
            Some(found) => {
                let previous = found.get().value.clone();
                self.read_set.push(found);
                // Splice the replacement in after whatever the matched
                // node's successor turns out to be under this view.
                let link = self.validated_succ(found, false)?;
                node.get().store_next(link.next);
                self.write_set.add_item(found, None, true);
                self.write_set.add_item(pred, Some(node), false);
                self.index_ops.push(IndexOp::remove(found));
                previous
            }
            None => {
                node.get().store_next(succ);
                self.write_set.add_item(pred, Some(node), false);
                self.write_set.add_item(node, None, false);
                None
            }
        };
        self.index_ops.push(IndexOp::insert(node));
        Ok(previous)
    }

    fn remove_at(&mut self, key: &K) -> Result<bool> {
        let (pred, succ) = self.traverse_to(key)?;
        let Some(found) = succ.filter(|n| n.get().key.matches(key)) else {
            return Ok(false);
        };

        self.read_set.push(found);
        let link = self.validated_succ(found, false)?;
        self.write_set.add_item(pred, link.next, false);
        self.write_set.add_item(found, None, true);
        self.index_ops.push(IndexOp::remove(found));
        Ok(true)
    }

    /// Locates `key` in the list under this transaction's view.
    ///
    /// Starts from the index's best-known entry point before `key`. While
    /// that entry turns out to be locked by an in-flight commit, or its
    /// validated state says deleted, steps back through strictly smaller
    /// index entries until a usable one is found (the head sentinel is the
    /// floor). Then walks forward with validated successor links, skipping
    /// deleted nodes, to the first node at or past `key`. The final
    /// predecessor lands in the read set.
    fn traverse_to(&mut self, key: &K) -> Result<(NodeRef<K, V>, Option<NodeRef<K, V>>)> {
        let mut start = self.index.prev_entry(key);
        let mut link = self.validated_succ(start, false)?;
        while start.get().is_locked() || link.deleted {
            start = self.index.step_back(&start.get().key);
            link = self.validated_succ(start, false)?;
        }

        let mut pred = start;
        let mut succ = link.next;
        let mut deleted = false;
        loop {
            let Some(candidate) = succ else { break };
            if !candidate.get().key.precedes(key) && !deleted {
                break;
            }
            pred = candidate;
            let step = self.validated_succ(candidate, false)?;
            succ = step.next;
            deleted = step.deleted;
        }

        self.read_set.push(pred);
        Ok((pred, succ))
    }

    /// Resolves a node's successor link under this transaction's view, or
    /// aborts when the node cannot be trusted at this snapshot.
    ///
    /// A locked node belongs to a commit in flight. A version past the
    /// snapshot means a later commit already changed the node.
    fn validated_succ(
        &self,
        node: NodeRef<K, V>,
        during_commit: bool,
    ) -> Result<ValidatedLink<K, V>> {
        if self.locked_by_other(node, during_commit) {
            return Err(SeleneError::TransactionConflict);
        }

        let n = node.get();
        let link = match self.write_set.lookup(node, &self.guard) {
            Some((next, deleted)) => ValidatedLink { next, deleted },
            None => ValidatedLink {
                next: n.successor(&self.guard),
                deleted: n.deleted.load(Ordering::SeqCst),
            },
        };

        if n.version.load(Ordering::SeqCst) > self.read_version {
            return Err(SeleneError::TransactionConflict);
        }
        // A commit may have taken the lock between the first check and
        // the version read; the second check closes that window.
        if self.locked_by_other(node, during_commit) {
            return Err(SeleneError::TransactionConflict);
        }
        Ok(link)
    }

    /// Whether `node` is held by some other transaction's commit. During
    /// our own commit the write-set nodes are held by us, and a lock we
    /// hold ourselves is not a conflict.
    fn locked_by_other(&self, node: NodeRef<K, V>, during_commit: bool) -> bool {
        node.get().is_locked() && !(during_commit && self.write_set.contains(&node))
    }

    /// Re-runs validation over every read-set node for its abort side
    /// effects: any of them turning out locked by a foreign commit, or
    /// stamped past the snapshot, fails the commit.
    fn validate_read_set(&self) -> Result<()> {
        for node in &self.read_set {
            self.validated_succ(*node, true)?;
        }
        Ok(())
    }
}

impl<K: 'static, V: 'static> Drop for Transaction<K, V> {
    fn drop(&mut self) {
        if !self.committed {
            // Staged-but-never-published allocations go straight back;
            // no other thread ever saw them.
            for node in self.fresh.drain(..) {
                unsafe { node.reclaim() };
            }
        }
    }
}

fn release_locks<K, V>(locked: &[NodeRef<K, V>]) {
    for node in locked {
        unsafe { node.get().unlock() };
    }
}
