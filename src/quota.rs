//! Per-caller admission control for the external matching provider.
//!
//! Every caller gets a daily call budget plus a minimum spacing between
//! calls. Counts live in a UTC calendar-day bucket and reset implicitly when
//! the bucket rolls over. Usage is recorded only after a successful external
//! call, so failed or cancelled attempts never consume quota.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Configuration for per-caller admission limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QuotaConfig {
    /// Maximum external calls per caller per UTC day.
    pub daily_limit: u32,
    /// Minimum spacing between two external calls by the same caller, in
    /// seconds.
    #[serde(with = "crate::serde_secs")]
    pub min_interval: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: 8,
            min_interval: Duration::from_secs(352),
        }
    }
}

impl QuotaConfig {
    pub fn with_daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed to the external matcher.
    Admitted,
    /// The caller's daily budget is exhausted until the UTC day rolls over.
    DailyLimitExceeded,
    /// The previous call was too recent; `wait` is the remaining spacing.
    TooSoon { wait: Duration },
}

/// Point-in-time view of one caller's quota state, for tests and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaUsage {
    pub day: NaiveDate,
    pub request_count: u32,
    pub last_request: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct QuotaState {
    day: NaiveDate,
    request_count: u32,
    last_request: Option<DateTime<Utc>>,
}

impl QuotaState {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            day,
            request_count: 0,
            last_request: None,
        }
    }

    /// Reset the counter when `now` has crossed into a new UTC day. The last
    /// request timestamp is kept so call spacing still holds across midnight.
    fn roll_day(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.request_count = 0;
        }
    }
}

/// Tracks per-caller daily call counts and last-call timestamps.
///
/// `admit` and `record_usage` are each atomic over the caller's state. To
/// make the admit -> external call -> record sequence linearizable, take the
/// caller's [`gate`](Self::gate) for the whole sequence; dropping the guard
/// without recording releases the slot with no side effects.
#[derive(Debug)]
pub struct QuotaLimiter {
    config: QuotaConfig,
    states: DashMap<String, Mutex<QuotaState>>,
    gates: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl QuotaLimiter {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Decide whether a prospective external call by `caller_id` may proceed.
    ///
    /// Evaluated atomically against the caller's state: the day bucket is
    /// rolled first, then the daily count, then the spacing since the last
    /// recorded call. Does not mutate the count; only a subsequent
    /// [`record_usage`](Self::record_usage) consumes quota.
    pub fn admit(&self, caller_id: &str, now: DateTime<Utc>) -> Admission {
        let today = now.date_naive();
        let entry = self
            .states
            .entry(caller_id.to_string())
            .or_insert_with(|| Mutex::new(QuotaState::fresh(today)));
        let mut state = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        state.roll_day(today);

        if state.request_count >= self.config.daily_limit {
            return Admission::DailyLimitExceeded;
        }

        if let Some(last) = state.last_request {
            let elapsed = (now - last).to_std().unwrap_or_default();
            if elapsed < self.config.min_interval {
                return Admission::TooSoon {
                    wait: self.config.min_interval - elapsed,
                };
            }
        }

        Admission::Admitted
    }

    /// Record one successful external call for `caller_id`.
    ///
    /// Invoked only after the matcher answered; failed attempts do not
    /// consume quota.
    pub fn record_usage(&self, caller_id: &str, now: DateTime<Utc>) {
        let today = now.date_naive();
        let entry = self
            .states
            .entry(caller_id.to_string())
            .or_insert_with(|| Mutex::new(QuotaState::fresh(today)));
        let mut state = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        state.roll_day(today);
        state.request_count = state.request_count.saturating_add(1);
        state.last_request = Some(now);
    }

    /// Per-caller exclusive gate serializing admit/record sequences.
    ///
    /// Held across the external call by the coordinator so concurrent bursts
    /// for one caller can never overshoot the daily limit or the minimum
    /// spacing.
    pub fn gate(&self, caller_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.gates
            .entry(caller_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Current usage for a caller, if any was ever recorded or checked.
    pub fn usage(&self, caller_id: &str) -> Option<QuotaUsage> {
        self.states.get(caller_id).map(|entry| {
            let state = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            QuotaUsage {
                day: state.day,
                request_count: state.request_count,
                last_request: state.last_request,
            }
        })
    }
}
