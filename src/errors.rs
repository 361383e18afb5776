use thiserror::Error;

/// Failure surface of the transactional API.
///
/// Aborting is the engine's single failure mode: the transaction observed
/// or raced a conflicting commit and must be discarded. Retry policy (how
/// many attempts, backoff) belongs to the caller, who starts over with a
/// fresh transaction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeleneError {
    #[error("Transaction conflict detected")]
    TransactionConflict,
}

pub type Result<T> = std::result::Result<T, SeleneError>;
