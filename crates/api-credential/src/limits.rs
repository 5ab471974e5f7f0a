//! Rate-limit configuration carried by credentials, plus the enforcement
//! seam.
//!
//! Credentials carry configuration only: a global rule and optional
//! per-endpoint overrides. Enforcement sits behind the [`RateGauge`]
//! trait so the algorithm can be swapped without touching the gate; the
//! shipped [`FixedWindowGauge`] counts requests in fixed windows anchored
//! at the first request of each window.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::endpoint::Endpoint;

/// Default global allowance: 1000 requests per 15 minutes.
pub const DEFAULT_WINDOW_MS: u64 = 15 * 60 * 1000;
pub const DEFAULT_MAX_REQUESTS: u32 = 1000;

/// A single rate-limit rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Message surfaced to blocked callers.
    pub message: String,
}

impl RateLimitRule {
    pub fn new(window_ms: u64, max_requests: u32, message: impl Into<String>) -> Self {
        Self {
            window_ms,
            max_requests,
            message: message.into(),
        }
    }
}

/// Rate-limit configuration carried by a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Applies to any request not covered by an endpoint override.
    pub global: RateLimitRule,
    /// Per-endpoint overrides, keyed by known endpoints only.
    #[serde(default)]
    pub endpoints: HashMap<Endpoint, RateLimitRule>,
}

impl Default for RateLimits {
    fn default() -> Self {
        let mut endpoints = HashMap::new();
        // Booking creation is the abuse magnet; keep its default tighter.
        endpoints.insert(
            Endpoint::Bookings,
            RateLimitRule::new(60_000, 60, "Booking request limit reached, slow down"),
        );
        Self {
            global: RateLimitRule::new(
                DEFAULT_WINDOW_MS,
                DEFAULT_MAX_REQUESTS,
                "Too many requests, please try again later",
            ),
            endpoints,
        }
    }
}

impl RateLimits {
    /// The rule in effect for a request: the endpoint override when one
    /// exists, the global rule otherwise.
    pub fn rule_for(&self, endpoint: Option<Endpoint>) -> &RateLimitRule {
        endpoint
            .and_then(|e| self.endpoints.get(&e))
            .unwrap_or(&self.global)
    }
}

// ============================================================================
// Enforcement
// ============================================================================

/// Enforce a rate-limit rule for one observed request.
pub trait RateGauge {
    /// Record one request against `(credential_id, endpoint)` and report
    /// whether it fits inside `rule`. Returns `false` when the request
    /// must be blocked.
    fn observe(
        &self,
        credential_id: Uuid,
        endpoint: Option<Endpoint>,
        rule: &RateLimitRule,
        now: DateTime<Utc>,
    ) -> bool;
}

/// Gauge that never blocks. For tests and callers enforcing elsewhere.
pub struct NoLimitGauge;

impl RateGauge for NoLimitGauge {
    fn observe(
        &self,
        _credential_id: Uuid,
        _endpoint: Option<Endpoint>,
        _rule: &RateLimitRule,
        _now: DateTime<Utc>,
    ) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// In-process fixed-window counter.
///
/// Each `(credential, endpoint)` scope gets one window anchored at its
/// first request; the counter resets when the window elapses. Counts live
/// only in this process — horizontal deployments need a shared gauge
/// behind the same trait.
#[derive(Default)]
pub struct FixedWindowGauge {
    windows: Mutex<HashMap<(Uuid, Option<Endpoint>), Window>>,
}

impl FixedWindowGauge {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateGauge for FixedWindowGauge {
    fn observe(
        &self,
        credential_id: Uuid,
        endpoint: Option<Endpoint>,
        rule: &RateLimitRule,
        now: DateTime<Utc>,
    ) -> bool {
        let mut guard = self.windows.lock().expect("rate gauge poisoned");
        let window = guard
            .entry((credential_id, endpoint))
            .or_insert(Window {
                started_at: now,
                count: 0,
            });

        let elapsed_ms = now
            .signed_duration_since(window.started_at)
            .num_milliseconds();
        if elapsed_ms >= rule.window_ms as i64 {
            window.started_at = now;
            window.count = 0;
        }

        window.count += 1;
        window.count <= rule.max_requests
    }
}
