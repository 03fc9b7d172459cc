//! Batch Scheduler
//!
//! Triggers never run subscribers directly. They land in a pending batch, and
//! the first one to arrive schedules a single deferred flush on the
//! microtask queue. The host drains that queue at its microtask boundary.
//!
//! # Algorithm
//!
//! 1. `enqueue` inserts into the pending set (a subscriber appears at most
//!    once) and pushes a `Flush` microtask if none is outstanding.
//! 2. A flush swaps the pending set out before running anything, so triggers
//!    raised while it runs start a fresh batch behind it in the queue.
//! 3. The swapped batch runs in first-enqueued order.

use std::collections::VecDeque;
use std::fmt;

use indexmap::IndexSet;

use crate::reactive::SubscriberId;

/// Deferred work, run in FIFO order.
pub enum Microtask {
    /// Run the pending batch.
    Flush,
    /// A host callback queued with `Runtime::queue_microtask`.
    Callback(Box<dyn FnOnce()>),
}

impl fmt::Debug for Microtask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Microtask::Flush => f.write_str("Flush"),
            Microtask::Callback(_) => f.write_str("Callback"),
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchScheduler {
    pending: IndexSet<SubscriberId>,
    flush_scheduled: bool,
    queue: VecDeque<Microtask>,
}

impl BatchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber to the pending batch.
    ///
    /// Returns `true` if this call scheduled a new flush.
    pub fn enqueue(&mut self, subscriber: SubscriberId) -> bool {
        self.pending.insert(subscriber);
        if self.flush_scheduled {
            return false;
        }
        self.flush_scheduled = true;
        self.queue.push_back(Microtask::Flush);
        true
    }

    /// Drop a subscriber from the pending batch.
    pub fn remove(&mut self, subscriber: SubscriberId) -> bool {
        self.pending.shift_remove(&subscriber)
    }

    pub fn queue_callback(&mut self, callback: Box<dyn FnOnce()>) {
        self.queue.push_back(Microtask::Callback(callback));
    }

    pub fn next_microtask(&mut self) -> Option<Microtask> {
        self.queue.pop_front()
    }

    /// Swap out the pending batch. Anything enqueued afterwards schedules a
    /// new flush.
    pub fn take_batch(&mut self) -> IndexSet<SubscriberId> {
        self.flush_scheduled = false;
        std::mem::take(&mut self.pending)
    }

    /// Forget the pending batch and any queued flush, keeping host callbacks.
    pub fn abandon(&mut self) -> usize {
        self.flush_scheduled = false;
        self.queue.retain(|task| !matches!(task, Microtask::Flush));
        std::mem::take(&mut self.pending).len()
    }

    #[cfg(test)]
    fn is_pending(&self, subscriber: SubscriberId) -> bool {
        self.pending.contains(&subscriber)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_enqueue_schedules_one_flush() {
        let mut scheduler = BatchScheduler::new();
        let (a, b) = (SubscriberId::new(), SubscriberId::new());

        assert!(scheduler.enqueue(a));
        assert!(!scheduler.enqueue(b));
        assert!(!scheduler.enqueue(a));

        assert_eq!(scheduler.pending_len(), 2);
        assert!(matches!(scheduler.next_microtask(), Some(Microtask::Flush)));
        assert!(scheduler.next_microtask().is_none());
    }

    #[test]
    fn batch_keeps_first_enqueue_order() {
        let mut scheduler = BatchScheduler::new();
        let ids: Vec<SubscriberId> = (0..4).map(|_| SubscriberId::new()).collect();
        for id in ids.iter().chain(ids.iter().rev()) {
            scheduler.enqueue(*id);
        }

        let batch: Vec<SubscriberId> = scheduler.take_batch().into_iter().collect();
        assert_eq!(batch, ids);
    }

    #[test]
    fn enqueue_during_flush_starts_new_batch() {
        let mut scheduler = BatchScheduler::new();
        let a = SubscriberId::new();

        scheduler.enqueue(a);
        scheduler.next_microtask();
        let batch = scheduler.take_batch();
        assert_eq!(batch.len(), 1);

        // re-entrant trigger while the batch runs
        assert!(scheduler.enqueue(a));
        assert!(scheduler.is_pending(a));
        assert!(matches!(scheduler.next_microtask(), Some(Microtask::Flush)));
    }

    #[test]
    fn removed_subscriber_leaves_batch() {
        let mut scheduler = BatchScheduler::new();
        let (a, b) = (SubscriberId::new(), SubscriberId::new());
        scheduler.enqueue(a);
        scheduler.enqueue(b);

        assert!(scheduler.remove(a));
        assert!(!scheduler.remove(a));
        assert_eq!(scheduler.take_batch().into_iter().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn callbacks_interleave_with_flushes() {
        let mut scheduler = BatchScheduler::new();
        scheduler.queue_callback(Box::new(|| {}));
        scheduler.enqueue(SubscriberId::new());
        scheduler.queue_callback(Box::new(|| {}));

        let order: Vec<String> = std::iter::from_fn(|| scheduler.next_microtask())
            .map(|task| format!("{task:?}"))
            .collect();
        assert_eq!(order, ["Callback", "Flush", "Callback"]);
    }

    #[test]
    fn abandon_keeps_callbacks() {
        let mut scheduler = BatchScheduler::new();
        scheduler.enqueue(SubscriberId::new());
        scheduler.queue_callback(Box::new(|| {}));

        assert_eq!(scheduler.abandon(), 1);
        assert!(matches!(scheduler.next_microtask(), Some(Microtask::Callback(_))));
        assert!(scheduler.is_idle());
    }
}
