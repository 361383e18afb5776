//! Selene: a transactional skip list.
//!
//! An ordered, in-memory key-value container whose every operation runs
//! inside a multi-operation transaction with optimistic concurrency
//! control: begin a transaction, run any number of
//! get/insert/put/remove/contains calls against a consistent snapshot,
//! then commit. The commit applies all buffered writes atomically or
//! aborts with [`SeleneError::TransactionConflict`], leaving the list
//! unchanged; aborted transactions are retried by the caller.

pub mod errors;
pub mod selene;
pub mod transaction;

mod clock;
mod index;
mod node;
mod write_set;

// Re-export key types and structs for easier access
pub use errors::{Result, SeleneError};
pub use selene::Selene;
pub use transaction::Transaction;
