//! Common utilities for Selene integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use selene::{Result, Selene, Transaction};

/// Fresh list, wrapped for sharing across test threads.
pub fn setup_list() -> Arc<Selene<String, i64>> {
    Arc::new(Selene::new())
}

/// Fixed-width keys so lexicographic order matches numeric order.
pub fn key(n: u32) -> String {
    format!("key{n:05}")
}

/// Runs `body` in fresh transactions until one of them commits, and
/// returns that attempt's result. This is the retry loop callers of the
/// transactional API are expected to drive: an abort at any point means
/// discard the transaction and start over.
pub fn run_to_commit<K, V, T>(
    list: &Selene<K, V>,
    mut body: impl FnMut(&mut Transaction<K, V>) -> Result<T>,
) -> T
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    loop {
        let mut txn = list.begin_transaction();
        let Ok(out) = body(&mut txn) else { continue };
        if txn.commit().is_ok() {
            return out;
        }
    }
}
