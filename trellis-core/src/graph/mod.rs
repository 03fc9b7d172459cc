//! Dependency Graph
//!
//! This module holds the bookkeeping that connects tracked reads to the
//! computations that made them, and the scheduler that batches the resulting
//! re-runs.
//!
//! # Overview
//!
//! - An edge says "subscriber S read property K of target T".
//! - Edges are recorded on tracked reads and removed in bulk right before a
//!   subscriber re-evaluates, so a subscriber only ever hears about what it
//!   read on its latest run.
//! - A write looks up the subscribers of `(T, K)` and hands them to the
//!   scheduler, which runs each of them at most once per flush.
//!
//! # Design Decisions
//!
//! 1. Edges are indexed both ways (property to subscribers, subscriber to
//!    properties) so clearing one subscriber never scans the whole graph.
//!
//! 2. Both sides use insertion-ordered sets, which makes notification order
//!    deterministic: subscribers run in the order they first subscribed.

mod edges;
mod scheduler;

pub use edges::{Dependency, DependencyGraph, Subscribers};
pub use scheduler::{BatchScheduler, Microtask};
