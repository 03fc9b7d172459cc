//! Error Types
//!
//! Every fallible operation in the crate returns [`Result`]. Effect bodies
//! return the same type so that wrapper reads and writes compose with `?`.

use thiserror::Error;

use crate::reactive::SubscriberId;
use crate::state::{PropKey, Shape};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the reactive runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A scoped effect was registered while no setup scope was open.
    #[error("scoped effects can only be registered while a setup scope is open")]
    NoRegistrationContext,

    /// An operation that needs one aggregate shape was applied to the other.
    #[error("expected a {expected} target, found a {found}")]
    ShapeMismatch { expected: Shape, found: Shape },

    /// A key that makes no sense for the target's shape.
    #[error("key `{key}` is not valid for a {shape} target")]
    InvalidKey { key: PropKey, shape: Shape },

    /// A splice range reached past the end of the sequence.
    #[error("range {start}..{end} is out of bounds for a sequence of length {len}")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },

    /// The runtime that owned a wrapper or effect no longer exists.
    #[error("the reactive runtime has been dropped")]
    RuntimeDropped,

    /// A subscriber tried to run while it was already running.
    #[error("subscriber {0} is already evaluating")]
    ReentrantEvaluation(SubscriberId),

    /// A drain kept scheduling new flushes past the configured limit.
    #[error("scheduler did not settle after {0} flushes")]
    FlushLimitExceeded(usize),

    /// A snapshot walked into a target that contains itself.
    #[error("cannot snapshot a target that contains itself")]
    Cycle,

    /// An error raised by caller code inside an effect body.
    #[error(transparent)]
    Evaluation(Box<dyn std::error::Error + 'static>),

    /// A plain message raised by caller code.
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Wrap an arbitrary caller error.
    pub fn evaluation<E>(err: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::Evaluation(Box::new(err))
    }

    /// Build an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_error_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = Error::evaluation(io);
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn shape_mismatch_names_both_shapes() {
        let err = Error::ShapeMismatch {
            expected: Shape::Sequence,
            found: Shape::Record,
        };
        assert_eq!(err.to_string(), "expected a sequence target, found a record");
    }
}
