//! Runtime Configuration

use serde::Deserialize;

use crate::error::{Error, Result};

/// What a flush does when one of its subscribers fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Keep running the rest of the batch and report every failure.
    #[default]
    Isolate,
    /// Stop at the first failure, dropping the rest of the batch.
    Abort,
}

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use trellis_core::{ErrorPolicy, RuntimeConfig};
///
/// let config = RuntimeConfig::from_json(r#"{ "error_policy": "abort" }"#).unwrap();
/// assert_eq!(config.error_policy, ErrorPolicy::Abort);
/// assert_eq!(config.max_flushes, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Failure handling inside a flush.
    pub error_policy: ErrorPolicy,

    /// Upper bound on flushes per `run_until_idle` call. Effects that keep
    /// re-triggering themselves hit this instead of spinning forever.
    pub max_flushes: usize,

    /// Registry size above which a drain ends with a sweep of dead targets.
    pub sweep_threshold: usize,

    /// How far past the end of a sequence a single write may land. The gap
    /// is padded with nulls, so this caps the allocation one write can cause.
    pub max_index_gap: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::Isolate,
            max_flushes: 100,
            sweep_threshold: 1024,
            max_index_gap: 65_536,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::evaluation)
    }
}
