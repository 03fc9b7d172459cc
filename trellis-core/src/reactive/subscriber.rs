//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that re-runs when properties it read
//! change: free-standing effects and mounted scoped effects.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

use super::Runtime;

/// Unique identifier for a subscriber.
///
/// Each subscriber gets a unique ID when created. The ID is the key of the
/// subscriber in the dependency graph and in the scheduler's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A computation the scheduler can re-run.
pub(crate) trait Subscriber {
    /// Get the subscriber's unique ID.
    fn id(&self) -> SubscriberId;

    /// Re-evaluate after one of the subscriber's dependencies changed.
    ///
    /// Implementations clear their old edges before evaluating again.
    fn run(&self, runtime: &Runtime) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_ids_increase() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        assert!(id1 < id2);
    }
}
