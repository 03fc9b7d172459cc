//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects wrappers, the
//! dependency graph, the scheduler and the effects built on top of them.
//!
//! # How It Works
//!
//! 1. A tracked read asks the runtime who is observing; if anyone is, the
//!    runtime records the edge `(target, key) -> observer`.
//!
//! 2. A changing write asks the runtime to trigger `(target, key)`. The
//!    runtime looks up the subscribers of that property and puts them in the
//!    pending batch. Nothing runs yet.
//!
//! 3. The host drains the microtask queue with [`Runtime::run_until_idle`].
//!    Each flush runs every batched subscriber once; a subscriber clears its
//!    old edges and evaluates again, recording fresh ones.
//!
//! # Ownership
//!
//! `Runtime` is a cheap handle; clones share one runtime. Wrappers, effects
//! and scopes only hold weak references back to it, and the runtime only
//! holds weak references to its subscribers. An effect lives as long as its
//! handles do, so once every handle is gone the whole graph is torn down,
//! even when effect bodies captured a `Runtime` clone.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::config::{ErrorPolicy, RuntimeConfig};
use crate::error::{Error, Result};
use crate::graph::{BatchScheduler, Dependency, DependencyGraph, Microtask};
use crate::state::registry::Registry;
use crate::state::{Linkage, PropKey, Target, TargetId, Wrapper, WrapperInner};

use super::context::{ContextGuard, ContextSlot, Observer};
use super::effect::{Effect, EffectInner};
use super::scoped::{Cleanup, Scope, ScopeInner, ScopedEffect, ScopedEffectInner};
use super::subscriber::{Subscriber, SubscriberId};

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    observer: ContextSlot<Observer>,
    registration: ContextSlot<Weak<ScopeInner>>,
    registry: RefCell<Registry>,
    graph: RefCell<DependencyGraph>,
    scheduler: RefCell<BatchScheduler>,
    subscribers: RefCell<HashMap<SubscriberId, Weak<dyn Subscriber>>>,
}

/// Handle to a reactive runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// One subscriber failure inside a flush.
#[derive(Debug)]
pub struct FlushFailure {
    pub subscriber: SubscriberId,
    pub error: Error,
}

/// Summary of one [`Runtime::run_until_idle`] drain.
#[derive(Debug, Default)]
pub struct Settled {
    /// Flushes executed.
    pub flushes: usize,
    /// Subscriber runs across all flushes.
    pub runs: usize,
    /// Failures collected under [`ErrorPolicy::Isolate`].
    pub failures: Vec<FlushFailure>,
}

impl Settled {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                observer: ContextSlot::new(),
                registration: ContextSlot::new(),
                registry: RefCell::new(Registry::new()),
                graph: RefCell::new(DependencyGraph::new()),
                scheduler: RefCell::new(BatchScheduler::new()),
                subscribers: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------------
    // Wrapping
    // ------------------------------------------------------------------------

    /// Get the wrapper for `target`, creating it on first use.
    ///
    /// While a wrapper for `target` is alive, every call returns that same
    /// wrapper.
    pub fn wrap(&self, target: &Target) -> Wrapper {
        if let Some(cached) = self.inner.registry.borrow().cached_wrapper(target.id()) {
            return Wrapper::from_inner(cached);
        }
        let wrapper = Wrapper::from_inner(Rc::new(WrapperInner::new(
            target.clone(),
            self.downgrade(),
        )));
        self.inner
            .registry
            .borrow_mut()
            .cache_wrapper(target, wrapper.inner());
        trace!(object = %target.id(), shape = %target.shape(), "wrapped target");
        wrapper
    }

    /// Wrap a target reached through `parent.key` and record that linkage.
    pub(crate) fn wrap_nested(&self, child: &Target, parent: TargetId, key: PropKey) -> Wrapper {
        let wrapper = self.wrap(child);
        if !self.inner.registry.borrow_mut().link(child.id(), parent, key) {
            trace!(child = %child.id(), parent = %parent, "refused cyclic parent linkage");
        }
        wrapper
    }

    pub(crate) fn parent_of(&self, target: TargetId) -> Option<Linkage> {
        self.inner.registry.borrow().parent(target).cloned()
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    /// Record that the current observer read `(target, key)`.
    pub(crate) fn track(&self, target: TargetId, key: &PropKey) {
        let Some(observer) = self.inner.observer.current() else {
            return;
        };
        let dependency = Dependency::new(target, key.clone());
        match observer {
            Observer::Subscriber(id) => {
                if self.inner.graph.borrow_mut().add_edge(dependency, id) {
                    trace!(subscriber = %id, object = %target, %key, "tracked");
                }
            }
            Observer::Capture(captured) => {
                captured.borrow_mut().insert(dependency);
            }
        }
    }

    /// Hand every subscriber of `(target, key)` to the scheduler.
    pub(crate) fn trigger(&self, target: TargetId, key: PropKey) {
        let dependency = Dependency::new(target, key);
        let subscribers = self.inner.graph.borrow().subscribers_of(&dependency);
        if subscribers.is_empty() {
            return;
        }
        trace!(object = %target, key = %dependency.key, count = subscribers.len(), "triggered");
        let mut scheduler = self.inner.scheduler.borrow_mut();
        for id in subscribers {
            scheduler.enqueue(id);
        }
    }

    /// Whether a tracked read right now would record an edge.
    pub fn is_tracking(&self) -> bool {
        self.inner.observer.is_active()
    }

    /// Run `f` without recording any dependencies.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _suspended = self.inner.observer.enter(None);
        f()
    }

    pub(crate) fn observe(&self, observer: Observer) -> ContextGuard<'_, Observer> {
        self.inner.observer.enter(Some(observer))
    }

    pub(crate) fn clear_edges(&self, subscriber: SubscriberId) -> usize {
        self.inner.graph.borrow_mut().clear_edges(subscriber)
    }

    pub(crate) fn subscribe_all<I>(&self, subscriber: SubscriberId, dependencies: I)
    where
        I: IntoIterator<Item = Dependency>,
    {
        let mut graph = self.inner.graph.borrow_mut();
        for dependency in dependencies {
            graph.add_edge(dependency, subscriber);
        }
    }

    // ------------------------------------------------------------------------
    // Subscriber table
    // ------------------------------------------------------------------------

    /// The table does not own the subscriber; its handle does.
    pub(crate) fn insert_subscriber(&self, subscriber: Rc<dyn Subscriber>) {
        let id = subscriber.id();
        self.inner
            .subscribers
            .borrow_mut()
            .insert(id, Rc::downgrade(&subscriber));
    }

    /// Drop a subscriber from the graph, the pending batch and the table.
    pub(crate) fn release_subscriber(&self, subscriber: SubscriberId) {
        let edges = self.clear_edges(subscriber);
        self.inner.scheduler.borrow_mut().remove(subscriber);
        self.inner.subscribers.borrow_mut().remove(&subscriber);
        debug!(%subscriber, edges, "released subscriber");
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    /// Create a free-standing effect and run it once.
    ///
    /// The first evaluation happens synchronously and its error, if any, is
    /// returned; a failed effect is not kept. Afterwards the effect re-runs
    /// in a flush whenever something it read changes, until it is disposed
    /// or its last handle is dropped.
    pub fn effect<F>(&self, body: F) -> Result<Effect>
    where
        F: FnMut() -> Result<()> + 'static,
    {
        let inner = Rc::new(EffectInner::new(Box::new(body), self.downgrade()));
        let id = inner.id();
        self.insert_subscriber(inner.clone());
        debug!(effect = %id, "created effect");

        match inner.evaluate(self) {
            Ok(()) => Ok(Effect::from_inner(inner)),
            Err(error) => {
                inner.mark_disposed();
                self.release_subscriber(id);
                Err(error)
            }
        }
    }

    /// Open the registration context of `scope` while `f` runs.
    pub fn with_registration<R>(&self, scope: &Scope, f: impl FnOnce() -> R) -> R {
        let _registration = self
            .inner
            .registration
            .enter(Some(Rc::downgrade(scope.inner())));
        f()
    }

    /// Register an effect owned by the currently open scope.
    ///
    /// The body runs once right away to discover what it reads and to hand
    /// back an optional cleanup; nothing is subscribed until the scope
    /// mounts. Fails with [`Error::NoRegistrationContext`] outside
    /// [`Runtime::with_registration`].
    pub fn register_scoped_effect<F>(&self, body: F) -> Result<ScopedEffect>
    where
        F: FnMut() -> Result<Option<Cleanup>> + 'static,
    {
        let scope = self
            .inner
            .registration
            .current()
            .and_then(|weak| weak.upgrade())
            .ok_or(Error::NoRegistrationContext)?;

        let inner = Rc::new(ScopedEffectInner::new(Box::new(body)));
        inner.register(self)?;
        debug!(effect = %inner.id(), "registered scoped effect");

        if scope.is_mounted() {
            inner.mount(self)?;
        }
        scope.adopt(inner.clone());
        Ok(ScopedEffect::from_inner(inner))
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Queue a host callback behind any flush already scheduled.
    pub fn queue_microtask(&self, callback: impl FnOnce() + 'static) {
        self.inner
            .scheduler
            .borrow_mut()
            .queue_callback(Box::new(callback));
    }

    /// Whether no microtask is waiting.
    pub fn is_idle(&self) -> bool {
        self.inner.scheduler.borrow().is_idle()
    }

    /// Drain the microtask queue, running every scheduled flush.
    ///
    /// Flushes scheduled while draining run in the same call, behind the
    /// ones already queued. Under [`ErrorPolicy::Abort`] the first failing
    /// subscriber ends its batch and is returned as the error; queued
    /// microtasks after it stay queued.
    pub fn run_until_idle(&self) -> Result<Settled> {
        let mut settled = Settled::default();
        loop {
            let task = self.inner.scheduler.borrow_mut().next_microtask();
            let Some(task) = task else {
                break;
            };
            match task {
                Microtask::Callback(callback) => callback(),
                Microtask::Flush => {
                    if settled.flushes == self.inner.config.max_flushes {
                        let dropped = self.inner.scheduler.borrow_mut().abandon();
                        warn!(
                            limit = self.inner.config.max_flushes,
                            dropped, "scheduler did not settle, abandoning batch"
                        );
                        return Err(Error::FlushLimitExceeded(self.inner.config.max_flushes));
                    }
                    settled.flushes += 1;
                    self.flush(&mut settled)?;
                }
            }
        }
        if self.inner.registry.borrow().len() >= self.inner.config.sweep_threshold {
            self.sweep();
        }
        Ok(settled)
    }

    fn flush(&self, settled: &mut Settled) -> Result<()> {
        let batch = self.inner.scheduler.borrow_mut().take_batch();
        debug!(size = batch.len(), "flushing batch");

        for id in batch {
            let subscriber = self.inner.subscribers.borrow().get(&id).and_then(Weak::upgrade);
            let Some(subscriber) = subscriber else {
                trace!(subscriber = %id, "skipping released subscriber");
                continue;
            };
            settled.runs += 1;
            if let Err(error) = subscriber.run(self) {
                warn!(subscriber = %id, %error, "subscriber failed during flush");
                match self.inner.config.error_policy {
                    ErrorPolicy::Isolate => settled.failures.push(FlushFailure {
                        subscriber: id,
                        error,
                    }),
                    ErrorPolicy::Abort => return Err(error),
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------------

    /// Evict bookkeeping for targets that have been dropped, along with every
    /// edge keyed by them. Returns the number of evicted targets.
    pub fn sweep(&self) -> usize {
        let dead = self.inner.registry.borrow_mut().sweep();
        if dead.is_empty() {
            return 0;
        }
        let mut graph = self.inner.graph.borrow_mut();
        let edges: usize = dead.iter().map(|id| graph.remove_target(*id)).sum();
        debug!(targets = dead.len(), edges, "swept dropped targets");
        dead.len()
    }

    /// Targets the registry currently holds bookkeeping for.
    pub fn tracked_targets(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Subscribers currently reading `key` on `wrapper`.
    pub fn subscriber_count(&self, wrapper: &Wrapper, key: impl Into<PropKey>) -> usize {
        self.inner
            .graph
            .borrow()
            .subscriber_count(&Dependency::new(wrapper.id(), key.into()))
    }

    pub(crate) fn dependency_count(&self, subscriber: SubscriberId) -> usize {
        self.inner.graph.borrow().dependency_count(subscriber)
    }

    /// Subscribers in the pending batch.
    pub fn pending(&self) -> usize {
        self.inner.scheduler.borrow().pending_len()
    }

    /// Live subscribers (effects plus mounted scoped effects).
    ///
    /// An effect leaves this count when disposed or when its last handle is
    /// dropped.
    pub fn subscriber_total(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    #[cfg(test)]
    pub(crate) fn graph_is_consistent(&self) -> bool {
        self.inner.graph.borrow().is_consistent()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("tracked_targets", &self.tracked_targets())
            .field("subscribers", &self.subscriber_total())
            .field("pending", &self.pending())
            .field("edges", &self.inner.graph.borrow().edge_count())
            .finish()
    }
}
