//! Per-credential usage counters.
//!
//! Counters are bounded: one total plus one slot per known [`Endpoint`].
//! The reset policy is a rolling 30-day window measured from the last
//! reset, not calendar-aligned.

use chrono::{DateTime, Duration, Utc};

use crate::endpoint::Endpoint;

/// Rolling reset window in days.
pub const USAGE_RESET_DAYS: i64 = 30;

/// Request counters for one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageCounters {
    /// Requests since the last reset.
    pub total_requests: u64,
    /// Start of the current rolling window.
    pub last_reset_at: DateTime<Utc>,
    per_endpoint: [u64; Endpoint::COUNT],
}

impl UsageCounters {
    /// Fresh counters with the window starting at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_requests: 0,
            last_reset_at: now,
            per_endpoint: [0; Endpoint::COUNT],
        }
    }

    /// Count for a single endpoint.
    pub fn count_for(&self, endpoint: Endpoint) -> u64 {
        self.per_endpoint[endpoint.index()]
    }

    /// Whether the rolling window has elapsed at `now`.
    pub fn reset_due(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_reset_at) >= Duration::days(USAGE_RESET_DAYS)
    }

    /// Record one request.
    ///
    /// When the window has elapsed, counters restart at 1 for the current
    /// call (the endpoint map keeps only the current endpoint) and the
    /// window is re-anchored at `now`. Unknown endpoints arrive here as
    /// `None` and only bump the total.
    pub fn record(&mut self, endpoint: Option<Endpoint>, now: DateTime<Utc>) {
        if self.reset_due(now) {
            self.total_requests = 1;
            self.per_endpoint = [0; Endpoint::COUNT];
            self.last_reset_at = now;
        } else {
            self.total_requests += 1;
        }
        if let Some(endpoint) = endpoint {
            self.per_endpoint[endpoint.index()] += 1;
        }
    }

    pub(crate) fn set_count(&mut self, endpoint: Endpoint, count: u64) {
        self.per_endpoint[endpoint.index()] = count;
    }
}
