//! Orchestration of one segment evaluation.
//!
//! `MatchCoordinator` is the only component callers interact with. Each
//! request walks a fixed path: derive the segment identity, check the result
//! cache, and on a miss take the single-flight claim for that identity,
//! consult the quota limiter, invoke the external matcher under a timeout,
//! and write the outcome back to the cache.
//!
//! Ordering guarantees:
//!
//! - a cache hit (including a cached zero-match outcome) returns without
//!   touching the quota limiter or the matcher;
//! - a quota rejection returns before the matcher is contacted;
//! - a matcher failure or timeout writes nothing to the cache and consumes
//!   no quota;
//! - concurrent requests for the same uncached identity trigger exactly one
//!   matcher call, and every waiter receives that call's outcome.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::EvaluatorConfig;
use crate::error::EvaluateError;
use crate::identity::SegmentIdentity;
use crate::matcher::TagMatcher;
use crate::quota::{Admission, QuotaLimiter};
use crate::singleflight::SingleFlight;
use crate::store::ResultStore;
use crate::types::{MatchRecord, SegmentDescriptor};

/// Front door for segment evaluation: result cache plus admission control in
/// front of the external matcher.
///
/// Constructed explicitly from its collaborators and shared by handle; there
/// is no process-wide instance.
pub struct MatchCoordinator {
    store: ResultStore,
    quota: QuotaLimiter,
    matcher: Arc<dyn TagMatcher>,
    flights: SingleFlight<Result<MatchRecord, EvaluateError>>,
    config: EvaluatorConfig,
}

impl MatchCoordinator {
    pub fn new(store: ResultStore, matcher: Arc<dyn TagMatcher>, config: EvaluatorConfig) -> Self {
        Self {
            store,
            quota: QuotaLimiter::new(config.quota),
            matcher,
            flights: SingleFlight::new(),
            config,
        }
    }

    /// The quota limiter backing this coordinator, for monitoring.
    pub fn quota(&self) -> &QuotaLimiter {
        &self.quota
    }

    /// Evaluate one segment on behalf of `caller_id`.
    ///
    /// Returns the cached or freshly computed [`MatchRecord`], or the quota /
    /// matcher error that stopped the request. Cancelling the returned future
    /// releases any single-flight claim and quota gate it held without
    /// consuming quota or writing the cache.
    pub async fn evaluate(
        &self,
        descriptor: &SegmentDescriptor,
        caller_id: &str,
    ) -> Result<MatchRecord, EvaluateError> {
        let identity = descriptor.identity();

        if let Some(record) = self.store.get(&identity).await {
            debug!(key = %identity.cache_key(), caller_id, "served from cache");
            return Ok(record);
        }

        let key = identity.cache_key();
        let outcome = self
            .flights
            .run(&key, || self.evaluate_miss(descriptor, &identity, caller_id))
            .await;

        if !outcome.is_leader() {
            debug!(%key, caller_id, "joined in-flight evaluation");
        }
        outcome.into_inner()
    }

    /// Cache-miss path, run by exactly one leader per identity at a time.
    async fn evaluate_miss(
        &self,
        descriptor: &SegmentDescriptor,
        identity: &SegmentIdentity,
        caller_id: &str,
    ) -> Result<MatchRecord, EvaluateError> {
        // A previous flight may have finished between our miss and winning
        // the claim.
        if let Some(record) = self.store.get(identity).await {
            return Ok(record);
        }

        // Hold the caller's gate across admit -> call -> record so bursts for
        // one caller can neither overshoot the daily limit nor the spacing.
        let gate = self.quota.gate(caller_id);
        let _lease = gate.lock().await;

        match self.quota.admit(caller_id, Utc::now()) {
            Admission::Admitted => {}
            Admission::DailyLimitExceeded => {
                debug!(caller_id, "rejected: daily limit exceeded");
                return Err(EvaluateError::DailyLimitExceeded {
                    limit: self.quota.config().daily_limit,
                });
            }
            Admission::TooSoon { wait } => {
                debug!(caller_id, wait_secs = wait.as_secs(), "rejected: too soon");
                return Err(EvaluateError::TooSoon { wait });
            }
        }

        let matched = tokio::time::timeout(
            self.config.matcher_timeout,
            self.matcher
                .match_segment(&descriptor.content, descriptor.duration_seconds),
        )
        .await;

        let candidates = match matched {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(fault)) => {
                warn!(caller_id, error = %fault, "external matcher failed");
                return Err(EvaluateError::MatcherFailure(fault.to_string()));
            }
            Err(_) => {
                warn!(
                    caller_id,
                    timeout_secs = self.config.matcher_timeout.as_secs(),
                    "external matcher timed out"
                );
                return Err(EvaluateError::MatcherTimeout {
                    timeout: self.config.matcher_timeout,
                });
            }
        };

        let record = MatchRecord::capped(candidates.into_iter().map(|c| c.tag).collect());
        self.store.put(identity, &record, self.config.cache_ttl).await;
        self.quota.record_usage(caller_id, Utc::now());

        debug!(
            key = %identity.cache_key(),
            caller_id,
            count = record.match_count,
            "evaluation complete"
        );
        Ok(record)
    }
}
