//! Tracked State
//!
//! Plain data ([`Target`], [`Value`]) and the interception layer that makes
//! it observable ([`Wrapper`]).
//!
//! # Concepts
//!
//! ## Targets
//!
//! A target is a caller-owned record or sequence. The runtime never copies
//! it; it only wraps it.
//!
//! ## Wrappers
//!
//! A wrapper intercepts reads and writes on one target. There is at most one
//! live wrapper per target, so wrapping the same target twice, or reading the
//! same nested property twice, yields the same handle.
//!
//! ## Parent Linkage
//!
//! A target reached through a property of another target remembers that
//! property. In-place sequence mutations use it to also notify whoever
//! observes the containing property.

mod key;
pub(crate) mod registry;
mod value;
mod wrapper;

pub use key::{Access, Comparator, PropKey, SequenceCall, SequenceOp};
pub use registry::Linkage;
pub use value::{Aggregate, Shape, Target, TargetId, Value};
pub use wrapper::{Outcome, Tracked, Wrapper};

pub(crate) use wrapper::WrapperInner;
