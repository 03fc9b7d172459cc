//! Trellis Core
//!
//! This crate provides a fine-grained reactive state runtime. It implements:
//!
//! - Transparent tracking of reads and writes on plain records and sequences
//! - A bidirectional dependency graph with per-subscriber cleanup
//! - A batching scheduler that runs each affected computation once per flush
//! - Free-standing effects and effects scoped to a host lifetime
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `state`: targets, values and the wrappers that intercept them
//! - `graph`: dependency edges and the batch scheduler
//! - `reactive`: the runtime, effects and scopes
//! - `config`: runtime configuration
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{Runtime, Target, Value};
//!
//! let runtime = Runtime::new();
//! let state = runtime.wrap(&Target::record([("count", Value::from(0))]));
//!
//! let s = state.clone();
//! let effect = runtime.effect(move || {
//!     println!("Count: {:?}", s.get("count")?.as_i64());
//!     Ok(())
//! })?;
//!
//! // Writes are batched until the host drains the microtask queue
//! state.set("count", 5)?;
//! state.set("count", 6)?;
//! runtime.run_until_idle()?; // prints "Count: Some(6)" once
//!
//! assert_eq!(effect.run_count(), 2);
//! # Ok::<(), trellis_core::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod state;

pub use config::{ErrorPolicy, RuntimeConfig};
pub use error::{Error, Result};
pub use reactive::{
    Cleanup, Effect, FlushFailure, Runtime, Scope, ScopedEffect, ScopedState, Settled,
    SubscriberId,
};
pub use state::{
    Access, Aggregate, Outcome, PropKey, SequenceCall, SequenceOp, Shape, Target, TargetId,
    Tracked, Value, Wrapper,
};
