use std::sync::Arc;

use crate::clock::VersionClock;
use crate::index::Index;
use crate::node::ListSpine;
use crate::transaction::Transaction;

/// Selene Prelude
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::selene::*;
    pub use crate::transaction::*;
}

/// The main entry point: an ordered, in-memory key-value list with
/// multi-operation transactions under optimistic concurrency control.
///
/// All access goes through transactions. A transaction sees a consistent
/// snapshot of the list, buffers its writes, and applies them atomically
/// at commit or not at all. Conflicts abort the transaction; the caller
/// retries with a fresh one.
///
/// The structure is shared freely across threads (typically behind an
/// [`Arc`]); transactions themselves are single-threaded handles.
///
/// # Examples
///
/// ```
/// use selene::Selene;
///
/// let list = Selene::new();
///
/// let mut txn = list.begin_transaction();
/// assert!(txn.insert("k1".to_string(), 10).unwrap());
/// assert_eq!(txn.get(&"k1".to_string()).unwrap(), Some(10));
/// txn.commit().unwrap();
///
/// let mut txn = list.begin_transaction();
/// assert_eq!(txn.put("k1".to_string(), 11).unwrap(), Some(10));
/// txn.commit().unwrap();
/// ```
pub struct Selene<K: 'static, V: 'static> {
    /// The global version clock ordering all commits on this list.
    clock: Arc<VersionClock>,
    /// The auxiliary fast-lookup index over a subset of live nodes.
    index: Arc<Index<K, V>>,
    /// The sorted node chain itself, bounded by its two sentinels.
    spine: Arc<ListSpine<K, V>>,
}

impl<K, V> Selene<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty list.
    pub fn new() -> Self {
        let spine = Arc::new(ListSpine::new());
        let index = Arc::new(Index::new(spine.head()));
        Self {
            clock: Arc::new(VersionClock::new()),
            index,
            spine,
        }
    }

    /// Starts a new transaction against the current snapshot.
    pub fn begin_transaction(&self) -> Transaction<K, V> {
        Transaction::new(
            Arc::clone(&self.clock),
            Arc::clone(&self.index),
            Arc::clone(&self.spine),
        )
    }

    /// The latest committed version of this list.
    pub fn current_version(&self) -> u64 {
        self.clock.read()
    }
}

impl<K, V> Default for Selene<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
