//! Reactive Context
//!
//! The reactive context tracks which computation is currently running, so a
//! tracked read knows whom to record as the reader.
//!
//! # Implementation
//!
//! Each runtime owns its own slots instead of sharing one global. Entering a
//! context swaps the new value into the slot and returns a guard that swaps
//! the previous value back on drop, including during unwinding. Nested
//! evaluations therefore restore the outer reader when they finish.
//!
//! The same mechanism backs the registration context that scoped effects
//! require.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::graph::Dependency;

use super::SubscriberId;

/// Who receives the edges recorded by tracked reads.
#[derive(Clone)]
pub(crate) enum Observer {
    /// Edges go straight into the dependency graph.
    Subscriber(SubscriberId),
    /// Edges are collected without subscribing anyone.
    Capture(Rc<RefCell<IndexSet<Dependency>>>),
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observer::Subscriber(id) => write!(f, "Subscriber({id})"),
            Observer::Capture(deps) => write!(f, "Capture({} deps)", deps.borrow().len()),
        }
    }
}

/// A save/restore slot holding the current value of one context.
pub(crate) struct ContextSlot<T: Clone> {
    current: RefCell<Option<T>>,
}

impl<T: Clone> ContextSlot<T> {
    pub fn new() -> Self {
        Self {
            current: RefCell::new(None),
        }
    }

    /// Make `value` current until the returned guard is dropped.
    ///
    /// Entering with `None` suspends the context.
    pub fn enter(&self, value: Option<T>) -> ContextGuard<'_, T> {
        let previous = self.current.replace(value);
        ContextGuard {
            slot: self,
            previous,
        }
    }

    pub fn current(&self) -> Option<T> {
        self.current.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.current.borrow().is_some()
    }
}

impl<T: Clone> Default for ContextSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores the previous context value when dropped.
pub(crate) struct ContextGuard<'a, T: Clone> {
    slot: &'a ContextSlot<T>,
    previous: Option<T>,
}

impl<T: Clone> Drop for ContextGuard<'_, T> {
    fn drop(&mut self) {
        self.slot.current.replace(self.previous.take());
    }
}
