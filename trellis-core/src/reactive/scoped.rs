//! Scoped Effects
//!
//! A scoped effect belongs to a host lifetime, modeled by [`Scope`]. It can
//! only be created while the scope's registration context is open, and its
//! subscription follows the scope rather than its own creation:
//!
//! ```text
//! registered --mount--> mounted --unmount--> unmounted --mount--> mounted
//! ```
//!
//! - Registration runs the body once, capturing what it reads and the cleanup
//!   it hands back. Nothing is subscribed yet.
//! - The first mount subscribes the captured dependencies without running the
//!   body again.
//! - A triggered re-run calls the previous cleanup, clears the old edges and
//!   evaluates again with tracking.
//! - Unmount calls the cleanup and drops every edge. A later mount evaluates
//!   the body afresh.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::Dependency;

use super::context::Observer;
use super::runtime::{Runtime, RuntimeInner};
use super::subscriber::{Subscriber, SubscriberId};

/// Callback a scoped effect hands back to run before its next evaluation
/// and on unmount.
pub type Cleanup = Box<dyn FnOnce()>;

pub(crate) type ScopedFn = Box<dyn FnMut() -> Result<Option<Cleanup>>>;

/// Lifecycle state of a scoped effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopedState {
    Registered,
    Mounted,
    Unmounted,
}

pub(crate) struct ScopedEffectInner {
    id: SubscriberId,
    body: RefCell<ScopedFn>,
    cleanup: RefCell<Option<Cleanup>>,
    captured: RefCell<IndexSet<Dependency>>,
    state: Cell<ScopedState>,
    run_count: Cell<usize>,
}

impl ScopedEffectInner {
    pub(crate) fn new(body: ScopedFn) -> Self {
        Self {
            id: SubscriberId::new(),
            body: RefCell::new(body),
            cleanup: RefCell::new(None),
            captured: RefCell::new(IndexSet::new()),
            state: Cell::new(ScopedState::Registered),
            run_count: Cell::new(0),
        }
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    fn evaluate(&self, runtime: &Runtime, observer: Observer) -> Result<Option<Cleanup>> {
        let mut body = self
            .body
            .try_borrow_mut()
            .map_err(|_| Error::ReentrantEvaluation(self.id))?;
        let _observing = runtime.observe(observer);
        self.run_count.set(self.run_count.get() + 1);
        (body)()
    }

    fn run_cleanup(&self) {
        let previous = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = previous {
            cleanup();
        }
    }

    /// First evaluation: record reads without subscribing.
    pub(crate) fn register(&self, runtime: &Runtime) -> Result<()> {
        let captured = Rc::new(RefCell::new(IndexSet::new()));
        let cleanup = self.evaluate(runtime, Observer::Capture(captured.clone()))?;
        *self.captured.borrow_mut() = captured.take();
        *self.cleanup.borrow_mut() = cleanup;
        Ok(())
    }

    pub(crate) fn mount(self: &Rc<Self>, runtime: &Runtime) -> Result<()> {
        match self.state.get() {
            ScopedState::Mounted => Ok(()),
            ScopedState::Registered => {
                runtime.insert_subscriber(self.clone());
                let captured = std::mem::take(&mut *self.captured.borrow_mut());
                debug!(effect = %self.id, dependencies = captured.len(), "mounted scoped effect");
                runtime.subscribe_all(self.id, captured);
                self.state.set(ScopedState::Mounted);
                Ok(())
            }
            ScopedState::Unmounted => {
                runtime.insert_subscriber(self.clone());
                self.state.set(ScopedState::Mounted);
                match self.evaluate(runtime, Observer::Subscriber(self.id)) {
                    Ok(cleanup) => {
                        *self.cleanup.borrow_mut() = cleanup;
                        debug!(effect = %self.id, "remounted scoped effect");
                        Ok(())
                    }
                    Err(error) => {
                        runtime.release_subscriber(self.id);
                        self.state.set(ScopedState::Unmounted);
                        Err(error)
                    }
                }
            }
        }
    }

    /// Run the cleanup and drop every edge. A runtime that is already gone
    /// has no edges left to drop.
    pub(crate) fn unmount(&self, runtime: Option<&Runtime>) {
        let state = self.state.replace(ScopedState::Unmounted);
        if state == ScopedState::Unmounted {
            return;
        }
        self.run_cleanup();
        self.captured.borrow_mut().clear();
        if let (ScopedState::Mounted, Some(runtime)) = (state, runtime) {
            runtime.release_subscriber(self.id);
        }
        debug!(effect = %self.id, "unmounted scoped effect");
    }
}

impl Subscriber for ScopedEffectInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn run(&self, runtime: &Runtime) -> Result<()> {
        if self.state.get() != ScopedState::Mounted {
            return Ok(());
        }
        self.run_cleanup();
        runtime.clear_edges(self.id);
        let cleanup = self.evaluate(runtime, Observer::Subscriber(self.id))?;
        *self.cleanup.borrow_mut() = cleanup;
        Ok(())
    }
}

/// Handle to a scoped effect. The owning [`Scope`] controls its lifecycle.
#[derive(Clone)]
pub struct ScopedEffect {
    inner: Rc<ScopedEffectInner>,
}

impl ScopedEffect {
    pub(crate) fn from_inner(inner: Rc<ScopedEffectInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    pub fn state(&self) -> ScopedState {
        self.inner.state.get()
    }

    /// Number of times the body has run, registration included.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }
}

impl fmt::Debug for ScopedEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedEffect")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .finish()
    }
}

pub(crate) struct ScopeInner {
    runtime: Weak<RuntimeInner>,
    effects: RefCell<Vec<Rc<ScopedEffectInner>>>,
    mounted: Cell<bool>,
}

impl ScopeInner {
    pub(crate) fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    pub(crate) fn adopt(&self, effect: Rc<ScopedEffectInner>) {
        self.effects.borrow_mut().push(effect);
    }

    fn effects(&self) -> Vec<Rc<ScopedEffectInner>> {
        self.effects.borrow().clone()
    }
}

/// One host lifetime owning a set of scoped effects.
///
/// Effects are registered inside [`Runtime::with_registration`]. Dropping the
/// scope unmounts it.
///
/// # Example
///
/// ```rust
/// use trellis_core::{Cleanup, Runtime, Scope, Target, Value};
///
/// let runtime = Runtime::new();
/// let state = runtime.wrap(&Target::record([("title", Value::from("draft"))]));
/// let scope = Scope::new(&runtime);
///
/// let s = state.clone();
/// runtime.with_registration(&scope, || {
///     runtime.register_scoped_effect(move || {
///         println!("title: {:?}", s.get("title")?.as_str());
///         let cleanup: Cleanup = Box::new(|| println!("cleanup"));
///         Ok(Some(cleanup))
///     })
/// })?;
///
/// scope.mount()?;
/// state.set("title", "final")?;
/// runtime.run_until_idle()?;
/// # Ok::<(), trellis_core::Error>(())
/// ```
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                runtime: runtime.downgrade(),
                effects: RefCell::new(Vec::new()),
                mounted: Cell::new(false),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Rc<ScopeInner> {
        &self.inner
    }

    /// Subscribe every owned effect. Mounting a mounted scope does nothing.
    ///
    /// Every effect is attempted; the first error is returned.
    pub fn mount(&self) -> Result<()> {
        if self.inner.mounted.get() {
            return Ok(());
        }
        let runtime = self
            .inner
            .runtime
            .upgrade()
            .map(Runtime::from_inner)
            .ok_or(Error::RuntimeDropped)?;
        self.inner.mounted.set(true);

        let mut first_error = None;
        for effect in self.inner.effects() {
            if let Err(error) = effect.mount(&runtime) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Run every cleanup and drop every edge the owned effects hold.
    pub fn unmount(&self) {
        self.inner.mounted.set(false);
        let runtime = self.inner.runtime.upgrade().map(Runtime::from_inner);
        for effect in self.inner.effects() {
            effect.unmount(runtime.as_ref());
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    /// Number of effects registered into this scope.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("mounted", &self.is_mounted())
            .field("effects", &self.effect_count())
            .finish()
    }
}
