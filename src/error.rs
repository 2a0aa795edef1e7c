//! Error types surfaced by the evaluation core.
//!
//! Cache- and store-layer failures are absorbed where they occur and degrade
//! the cache to "always miss"; quota and matcher failures are surfaced to the
//! caller with a stable kind and message. Nothing here terminates the
//! process.

use std::time::Duration;
use thiserror::Error;

/// Errors returned to callers of `MatchCoordinator::evaluate`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluateError {
    /// The caller exhausted its daily call budget. Terminal for the remainder
    /// of the caller's UTC day.
    #[error("you have reached the {limit} counts finger printing limit in a day")]
    DailyLimitExceeded { limit: u32 },
    /// The caller's previous external call was too recent. Carries the
    /// remaining wait as a retry hint.
    #[error("minimum interval between match calls not met; retry in {}s", .wait.as_secs())]
    TooSoon { wait: Duration },
    /// The external matcher did not answer within the configured timeout.
    /// Nothing was cached and no quota was consumed.
    #[error("external matcher timed out after {}s", .timeout.as_secs())]
    MatcherTimeout { timeout: Duration },
    /// The external matcher reported a failure. Nothing was cached and no
    /// quota was consumed.
    #[error("external matcher failed: {0}")]
    MatcherFailure(String),
}

impl EvaluateError {
    /// Whether the caller may retry this request.
    ///
    /// `DailyLimitExceeded` is the only terminal kind: it holds until the
    /// caller's UTC day rolls over.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, EvaluateError::DailyLimitExceeded { .. })
    }
}

/// Errors raised by a cache backend.
///
/// These never escape the store layer: `ResultStore` maps both kinds to a
/// cache miss, since the cache is strictly an optimization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The backing store could not be reached. Reads degrade to Absent and
    /// writes to a no-op.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    /// A stored record was corrupted or unparseable. Treated as Absent; the
    /// entry self-heals on the next successful write.
    #[error("malformed cache entry at {key}: {reason}")]
    MalformedEntry { key: String, reason: String },
}
