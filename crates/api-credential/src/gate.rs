//! Request-side authorization.
//!
//! The gate is the subsystem's inbound surface: the HTTP layer hands it
//! a raw key, the request origin and a target endpoint identifier, and
//! gets back an allow/deny decision. Checks run cheapest-first so
//! invalid-key probing stays inexpensive, and a rate-limited request is
//! denied before any usage counter moves.
//!
//! Every denial is logged with its precise reason; callers only ever see
//! [`GENERIC_DENIAL`], so a probing client cannot learn which check
//! failed.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::credential::{Credential, KeyHasher, PREFIX_LEN, RAW_KEY_LEN};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::limits::RateGauge;
use crate::store::CredentialStore;

/// The only message surfaced to callers on any authentication failure.
pub const GENERIC_DENIAL: &str = "Invalid or unauthorized API credentials";

/// Why a request was denied. Logged server-side, never sent to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Supplied key has the wrong shape; rejected before any lookup.
    MalformedKey,
    /// No credential matches the key prefix.
    UnknownKey,
    InactiveOrExpired,
    /// Prefix matched but the digest comparison failed.
    KeyMismatch,
    DomainNotWhitelisted,
    RateLimitExceeded,
}

/// Outcome of an authorization check.
#[derive(Debug)]
pub enum Decision {
    /// Request may proceed; carries the post-increment credential state.
    Allowed { credential: Box<Credential> },
    Denied { reason: DenyReason },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Message for the caller. Identical for every denial by design;
    /// the reason stays in the server-side logs.
    pub fn public_message(&self) -> Option<&'static str> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { .. } => Some(GENERIC_DENIAL),
        }
    }

    fn denied(reason: DenyReason, prefix: &str) -> Self {
        // Only the plaintext prefix is ever logged, never the key itself.
        log::warn!("request denied ({reason:?}) for key prefix {prefix:?}");
        Decision::Denied { reason }
    }
}

/// Authorization front door wiring the store, the key hasher and a rate
/// gauge together.
pub struct AccessGate {
    store: Arc<CredentialStore>,
    hasher: KeyHasher,
    gauge: Box<dyn RateGauge + Send + Sync>,
}

impl AccessGate {
    pub fn new(
        store: Arc<CredentialStore>,
        hasher: KeyHasher,
        gauge: Box<dyn RateGauge + Send + Sync>,
    ) -> Self {
        Self {
            store,
            hasher,
            gauge,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Authorize one request.
    ///
    /// `endpoint` is the route identifier from the HTTP layer; unknown
    /// identifiers still count against the global limit and total usage
    /// but are never stored as counter keys.
    pub fn authorize(
        &self,
        raw_key: &str,
        origin: &str,
        endpoint: Option<&str>,
    ) -> Result<Decision> {
        self.authorize_at(raw_key, origin, endpoint, Utc::now())
    }

    /// [`Self::authorize`] with an explicit clock.
    pub fn authorize_at(
        &self,
        raw_key: &str,
        origin: &str,
        endpoint: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        // Shape check before touching storage or hashing anything.
        if raw_key.len() != RAW_KEY_LEN || !raw_key.is_ascii() {
            return Ok(Decision::denied(DenyReason::MalformedKey, "<malformed>"));
        }
        let prefix = &raw_key[..PREFIX_LEN];

        let mut credential = match self.store.find_by_prefix(prefix)? {
            Some(credential) => credential,
            None => return Ok(Decision::denied(DenyReason::UnknownKey, prefix)),
        };

        if !credential.is_active || credential.is_expired(now) {
            return Ok(Decision::denied(DenyReason::InactiveOrExpired, prefix));
        }

        if !credential.verify_raw_key(raw_key, &self.hasher) {
            return Ok(Decision::denied(DenyReason::KeyMismatch, prefix));
        }

        if !credential.domain_allowed(origin, now) {
            return Ok(Decision::denied(DenyReason::DomainNotWhitelisted, prefix));
        }

        let endpoint = endpoint.and_then(Endpoint::parse);
        let rule = credential.rate_limits.rule_for(endpoint).clone();
        if !self.gauge.observe(credential.id, endpoint, &rule, now) {
            // Blocked requests never reach the usage counters.
            return Ok(Decision::denied(DenyReason::RateLimitExceeded, prefix));
        }

        self.store.record_usage_at(&mut credential, endpoint, now)?;

        Ok(Decision::Allowed {
            credential: Box::new(credential),
        })
    }
}
