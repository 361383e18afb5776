use std::sync::atomic::{AtomicU64, Ordering};

/// The global version clock shared by every transaction on one list.
///
/// Snapshot timestamps come from [`VersionClock::read`] and never move the
/// clock; commit timestamps come from [`VersionClock::advance`], exactly
/// once per successful commit, so committed versions are totally ordered
/// and never reused.
#[derive(Debug, Default)]
pub(crate) struct VersionClock {
    current: AtomicU64,
}

impl VersionClock {
    pub(crate) fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
        }
    }

    /// Returns the latest committed version without advancing the clock.
    pub(crate) fn read(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Atomically increments the clock and returns the new value.
    pub(crate) fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }
}
