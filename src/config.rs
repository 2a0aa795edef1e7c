//! Runtime configuration for the evaluation core.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::quota::QuotaConfig;

/// Configuration for `MatchCoordinator`.
///
/// Defaults carry the contract values: results (positive and negative) are
/// cached for 24 hours, and the external matcher is bounded by a 30 second
/// timeout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EvaluatorConfig {
    /// Time-to-live applied to every cache write, in seconds.
    #[serde(with = "crate::serde_secs")]
    pub cache_ttl: Duration,
    /// Upper bound on one external matcher call, in seconds. On timeout the
    /// in-flight claim is released and the error is surfaced as retryable.
    #[serde(with = "crate::serde_secs")]
    pub matcher_timeout: Duration,
    /// Per-caller admission limits protecting the matching provider.
    pub quota: QuotaConfig,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            matcher_timeout: Duration::from_secs(30),
            quota: QuotaConfig::default(),
        }
    }
}

impl EvaluatorConfig {
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_matcher_timeout(mut self, timeout: Duration) -> Self {
        self.matcher_timeout = timeout;
        self
    }

    pub fn with_quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }
}
