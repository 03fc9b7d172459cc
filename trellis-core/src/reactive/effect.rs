//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately, as the active
//!    observer, to establish its initial dependencies.
//!
//! 2. When any dependency changes, the effect is batched and re-run at the
//!    next flush.
//!
//! 3. Before re-running, the effect clears its old dependencies and tracks
//!    new ones during execution, so a branch it stopped taking no longer
//!    notifies it.
//!
//! # Lifecycle
//!
//! inactive -> active on creation, active -> disposed on [`Effect::dispose`]
//! or when the last [`Effect`] handle is dropped. The runtime only keeps a
//! weak reference, so an effect nobody holds is released along with the
//! targets its body captured.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::error::{Error, Result};

use super::context::Observer;
use super::runtime::{Runtime, RuntimeInner};
use super::subscriber::{Subscriber, SubscriberId};

pub(crate) type EffectFn = Box<dyn FnMut() -> Result<()>>;

pub(crate) struct EffectInner {
    id: SubscriberId,
    body: RefCell<EffectFn>,
    disposed: Cell<bool>,
    run_count: Cell<usize>,
    runtime: Weak<RuntimeInner>,
}

impl EffectInner {
    pub(crate) fn new(body: EffectFn, runtime: Weak<RuntimeInner>) -> Self {
        Self {
            id: SubscriberId::new(),
            body: RefCell::new(body),
            disposed: Cell::new(false),
            run_count: Cell::new(0),
            runtime,
        }
    }

    /// Run the body with this effect as the observer.
    pub(crate) fn evaluate(&self, runtime: &Runtime) -> Result<()> {
        let mut body = self
            .body
            .try_borrow_mut()
            .map_err(|_| Error::ReentrantEvaluation(self.id))?;
        let _observing = runtime.observe(Observer::Subscriber(self.id));
        self.run_count.set(self.run_count.get() + 1);
        (body)()
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.set(true);
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if self.disposed.get() {
            return;
        }
        if let Some(runtime) = self.runtime.upgrade().map(Runtime::from_inner) {
            runtime.release_subscriber(self.id);
        }
    }
}

impl Subscriber for EffectInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn run(&self, runtime: &Runtime) -> Result<()> {
        if self.disposed.get() {
            return Ok(());
        }
        runtime.clear_edges(self.id);
        self.evaluate(runtime)
    }
}

/// Handle to a free-standing effect. Also serves as its disposer.
///
/// Clones share the effect. Dropping the last one disposes it.
///
/// # Example
///
/// ```rust
/// use trellis_core::{Runtime, Target, Value};
///
/// let runtime = Runtime::new();
/// let state = runtime.wrap(&Target::record([("count", Value::from(0))]));
///
/// let s = state.clone();
/// let effect = runtime.effect(move || {
///     println!("count is {:?}", s.get("count")?.as_i64());
///     Ok(())
/// })?;
///
/// state.set("count", 5)?;
/// runtime.run_until_idle()?; // prints "count is Some(5)"
/// assert_eq!(effect.run_count(), 2);
///
/// effect.dispose();
/// # Ok::<(), trellis_core::Error>(())
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    pub(crate) fn from_inner(inner: Rc<EffectInner>) -> Self {
        Self { inner }
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Stop the effect for good.
    ///
    /// Its edges are removed right away and it leaves any pending batch.
    /// Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        if let Some(runtime) = self.inner.runtime.upgrade().map(Runtime::from_inner) {
            runtime.release_subscriber(self.inner.id);
        }
        debug!(effect = %self.inner.id, "disposed effect");
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Get the number of times the body has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of properties the effect currently depends on.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .runtime
            .upgrade()
            .map(Runtime::from_inner)
            .map_or(0, |runtime| runtime.dependency_count(self.inner.id))
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Target, Value};

    fn record(runtime: &Runtime, fields: &[(&str, i64)]) -> crate::state::Wrapper {
        runtime.wrap(&Target::record(
            fields.iter().map(|(k, v)| (*k, Value::from(*v))),
        ))
    }

    #[test]
    fn effect_runs_on_creation() {
        let runtime = Runtime::new();
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let _effect = runtime
            .effect(move || {
                run_count_clone.set(run_count_clone.get() + 1);
                Ok(())
            })
            .unwrap();

        // Effect should have run once on creation
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn effect_tracks_run_count() {
        let runtime = Runtime::new();
        let state = record(&runtime, &[("a", 0)]);

        let s = state.clone();
        let effect = runtime
            .effect(move || {
                s.get("a")?;
                Ok(())
            })
            .unwrap();
        assert_eq!(effect.run_count(), 1);

        state.set("a", 1).unwrap();
        runtime.run_until_idle().unwrap();
        assert_eq!(effect.run_count(), 2);

        state.set("a", 2).unwrap();
        runtime.run_until_idle().unwrap();
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let runtime = Runtime::new();
        let state = record(&runtime, &[("a", 0)]);

        let s = state.clone();
        let effect = runtime
            .effect(move || {
                s.get("a")?;
                Ok(())
            })
            .unwrap();

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(effect.dependency_count(), 0);

        state.set("a", 1).unwrap();
        runtime.run_until_idle().unwrap();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn disposal_while_pending_skips_the_run() {
        let runtime = Runtime::new();
        let state = record(&runtime, &[("a", 0)]);

        let s = state.clone();
        let effect = runtime
            .effect(move || {
                s.get("a")?;
                Ok(())
            })
            .unwrap();

        state.set("a", 1).unwrap();
        assert_eq!(runtime.pending(), 1);
        effect.dispose();
        assert_eq!(runtime.pending(), 0);

        let settled = runtime.run_until_idle().unwrap();
        assert_eq!(settled.runs, 0);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_disposed_by_earlier_subscriber_in_same_flush_is_skipped() {
        let runtime = Runtime::new();
        let state = record(&runtime, &[("a", 0)]);
        let victim: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

        let (s, v) = (state.clone(), victim.clone());
        let _killer = runtime
            .effect(move || {
                if s.get("a")?.as_i64() == Some(1) {
                    if let Some(effect) = v.borrow().as_ref() {
                        effect.dispose();
                    }
                }
                Ok(())
            })
            .unwrap();

        let s = state.clone();
        let target = runtime
            .effect(move || {
                s.get("a")?;
                Ok(())
            })
            .unwrap();
        *victim.borrow_mut() = Some(target.clone());

        state.set("a", 1).unwrap();
        let settled = runtime.run_until_idle().unwrap();

        assert_eq!(settled.runs, 1);
        assert!(target.is_disposed());
        assert_eq!(target.run_count(), 1);
    }

    #[test]
    fn effect_clone_shares_state() {
        let runtime = Runtime::new();
        let effect1 = runtime.effect(|| Ok(())).unwrap();
        let effect2 = effect1.clone();

        // Same ID
        assert_eq!(effect1.id(), effect2.id());
        assert_eq!(effect2.run_count(), 1);

        // Shared disposal state
        effect1.dispose();
        assert!(effect2.is_disposed());
    }

    #[test]
    fn nested_effect_restores_outer_observer() {
        let runtime = Runtime::new();
        let state = record(&runtime, &[("outer", 0), ("inner", 0)]);
        let inner_effect: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

        let (s, rt, slot) = (state.clone(), runtime.clone(), inner_effect.clone());
        let outer = runtime
            .effect(move || {
                if slot.borrow().is_none() {
                    let s2 = s.clone();
                    let created = rt.effect(move || {
                        s2.get("inner")?;
                        Ok(())
                    })?;
                    *slot.borrow_mut() = Some(created);
                }
                // read after the nested effect finished
                s.get("outer")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(outer.dependency_count(), 1);
        assert_eq!(runtime.subscriber_count(&state, "outer"), 1);
        assert_eq!(runtime.subscriber_count(&state, "inner"), 1);

        let inner = inner_effect.borrow().clone().unwrap();
        assert_eq!(inner.dependency_count(), 1);
        assert!(!runtime.is_tracking());
    }

    #[test]
    fn self_forced_run_is_reentrant_error() {
        let runtime = Runtime::new();
        let state = record(&runtime, &[("a", 0)]);

        let (s, rt) = (state.clone(), runtime.clone());
        let _effect = runtime
            .effect(move || {
                let a = s.get("a")?.as_i64().unwrap_or_default();
                if a == 1 {
                    // Bump and flush from inside our own run
                    s.set("a", 2)?;
                    let settled = rt.run_until_idle()?;
                    if let Some(failure) = settled.failures.into_iter().next() {
                        return Err(failure.error);
                    }
                }
                Ok(())
            })
            .unwrap();

        state.set("a", 1).unwrap();
        let settled = runtime.run_until_idle().unwrap();
        assert_eq!(settled.failures.len(), 1);
        assert!(matches!(
            settled.failures[0].error,
            Error::ReentrantEvaluation(_)
        ));
    }
}
