//! Seam to the external matching provider.
//!
//! Matching against the authoritative fingerprint corpus is expensive and
//! rate-constrained, and the algorithm itself is outside this core. Callers
//! hand the coordinator an implementation of [`TagMatcher`]; everything in
//! front of it (cache, quota, single-flight, timeout) is this crate's job.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::MatchCandidate;

/// Failure reported by the matching provider.
///
/// Surfaced to evaluate() callers as a retryable error; a failed attempt is
/// never cached and never consumes quota.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct MatcherFault(pub String);

impl MatcherFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The external matching provider, consumed as a black box.
///
/// Implementations receive the segment's audio bytes and its duration and
/// return every candidate the corpus matched, with the provider's score and
/// similarity attached. Candidates outside the contract thresholds (see
/// [`crate::types::SCORE_MAX_THRESHOLD`] and the similarity bounds) are
/// filtered by the calling layer, not here.
#[async_trait]
pub trait TagMatcher: Send + Sync {
    async fn match_segment(
        &self,
        content: &[u8],
        duration_seconds: f64,
    ) -> Result<Vec<MatchCandidate>, MatcherFault>;
}
