//! API-key credential lifecycle for the booking platform.
//!
//! This crate owns everything between "a partner was handed a key" and
//! "a request carrying that key may proceed":
//! - Issuance: a raw key is generated, shown once, and stored only as a
//!   peppered digest plus a short plaintext lookup prefix
//! - Validation: prefix, state, digest, origin whitelist and rate limit,
//!   checked cheapest-first
//! - Usage tracking: bounded per-endpoint counters with a rolling
//!   30-day reset, incremented atomically in storage
//! - Rotation: replacement credentials linked to their predecessor for
//!   audit, with the old key deactivated but retained
//! - Cleanup: retired credentials purged once past the retention window
//! - Booking references: globally-unique public codes allocated against
//!   the store's uniqueness constraint
//!
//! Cryptography lives in the `crypto-core` crate; HTTP parsing, booking
//! CRUD and payments are other components' business. The [`AccessGate`]
//! is the seam the request layer talks to.

mod credential;
mod endpoint;
mod error;
mod gate;
mod janitor;
mod limits;
mod refnum;
mod store;
mod usage;

// Public re-exports
pub use credential::{
    Credential, IssueRequest, KeyHasher, MAX_WHITELIST_DOMAINS, PREFIX_LEN, RAW_KEY_LEN,
    RETENTION_DAYS, ROTATED_TAG, ROTATION_DAYS, RawKey,
};
pub use endpoint::Endpoint;
pub use error::{CredentialError, Result};
pub use gate::{AccessGate, Decision, DenyReason, GENERIC_DENIAL};
pub use janitor::Janitor;
pub use limits::{
    DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS, FixedWindowGauge, NoLimitGauge, RateGauge,
    RateLimitRule, RateLimits,
};
pub use refnum::{
    DEFAULT_MAX_ATTEMPTS, FixedDelay, NoDelay, ReferenceAllocator, RetryDelay, parse_reference,
};
pub use store::CredentialStore;
pub use usage::{USAGE_RESET_DAYS, UsageCounters};
