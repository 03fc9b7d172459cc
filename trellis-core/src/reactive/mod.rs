//! Reactive Primitives
//!
//! This module implements the reactive runtime and the two effect flavors
//! built on it.
//!
//! # Concepts
//!
//! ## Runtime
//!
//! A [`Runtime`] owns the wrapper cache, the dependency graph and the
//! scheduler. Every wrapper and effect belongs to exactly one runtime.
//!
//! ## Effects
//!
//! An [`Effect`] is a free-standing computation: it runs once on creation and
//! again, batched, whenever something it read changes, until disposed.
//!
//! ## Scoped Effects
//!
//! A [`ScopedEffect`] belongs to a [`Scope`], a host lifetime. Its
//! subscription starts when the scope mounts and ends when it unmounts.
//!
//! # Implementation Notes
//!
//! Tracking is automatic: the runtime keeps a save/restore slot naming the
//! computation currently evaluating, and every tracked read records an edge
//! for whoever occupies it.

mod context;
mod effect;
mod runtime;
mod scoped;
mod subscriber;

pub use effect::Effect;
pub use runtime::{FlushFailure, Runtime, Settled};
pub use scoped::{Cleanup, Scope, ScopedEffect, ScopedState};
pub use subscriber::SubscriberId;

pub(crate) use runtime::RuntimeInner;
