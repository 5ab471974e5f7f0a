//! The API-key credential entity and its lifecycle operations.
//!
//! A credential never stores its raw secret. Issuance returns the raw key
//! exactly once alongside the stored form (digest + plaintext prefix);
//! afterwards the secret is unrecoverable. Rotation issues a replacement
//! credential and deactivates the old one while keeping an audit link
//! between the two.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use zeroize::Zeroize;

use crypto_core::{DEFAULT_TOKEN_BYTES, digest, generate_secure_token, timing_safe_compare};

use crate::error::{CredentialError, Result};
use crate::limits::RateLimits;
use crate::usage::UsageCounters;

/// Plaintext-stored leading fragment of a raw key, used for lookup.
pub const PREFIX_LEN: usize = 8;
/// Raw keys are 32 random bytes, hex encoded.
pub const RAW_KEY_LEN: usize = 2 * DEFAULT_TOKEN_BYTES;
/// Upper bound on whitelist size.
pub const MAX_WHITELIST_DOMAINS: usize = 20;
/// Default credential lifetime and the age at which rotation is advised.
pub const ROTATION_DAYS: i64 = 90;
/// How long an inactive credential is retained past its expiry.
pub const RETENTION_DAYS: i64 = 30;

/// Tag added to credentials created through rotation.
pub const ROTATED_TAG: &str = "rotated";

// ============================================================================
// Key hashing context
// ============================================================================

/// At-rest hashing context for raw keys.
///
/// Carries the optional pepper so the digest scheme is injected where it
/// is used instead of read from a global. Not `Debug`: the pepper stays
/// out of logs.
#[derive(Clone)]
pub struct KeyHasher {
    pepper: Option<String>,
}

impl KeyHasher {
    pub fn new(pepper: Option<String>) -> Self {
        Self { pepper }
    }

    /// Hasher peppered from `ENCRYPTION_SALT`, when set.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(crypto_core::ENCRYPTION_SALT_VAR)
                .ok()
                .filter(|s| !s.is_empty()),
        )
    }

    /// Digest of a raw key as persisted in `key_hash`.
    pub fn hash_raw(&self, raw_key: &str) -> String {
        digest(raw_key, self.pepper.as_deref())
    }
}

// ============================================================================
// Raw key
// ============================================================================

/// A freshly issued raw key. Returned to the caller exactly once; the
/// memory is wiped on drop.
pub struct RawKey(String);

impl RawKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Drop for RawKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// ============================================================================
// Issue request
// ============================================================================

/// Parameters for issuing a new credential.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub name: String,
    pub created_by: String,
    pub domain_whitelist: Vec<String>,
    pub allow_wildcard_subdomains: bool,
    pub rate_limits: Option<RateLimits>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

impl IssueRequest {
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_by: created_by.into(),
            domain_whitelist: Vec::new(),
            allow_wildcard_subdomains: false,
            rate_limits: None,
            expires_at: None,
            notes: None,
            tags: Vec::new(),
        }
    }

    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domain_whitelist = domains;
        self
    }

    pub fn with_wildcard_subdomains(mut self) -> Self {
        self.allow_wildcard_subdomains = true;
        self
    }

    pub fn with_rate_limits(mut self, limits: RateLimits) -> Self {
        self.rate_limits = Some(limits);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

// ============================================================================
// Credential
// ============================================================================

/// An API-key credential as held in storage. The raw secret exists only
/// in the [`RawKey`] returned at issuance or rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub id: Uuid,
    pub name: String,
    /// Peppered digest of the raw key. Never the secret itself.
    pub key_hash: String,
    /// First [`PREFIX_LEN`] characters of the raw key, stored in plaintext.
    pub key_prefix: String,
    pub domain_whitelist: Vec<String>,
    pub allow_wildcard_subdomains: bool,
    pub rate_limits: RateLimits,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Audit back-reference to the credential this one replaced.
    pub rotated_from: Option<Uuid>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub usage: UsageCounters,
    pub created_by: String,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Issue a new credential.
    ///
    /// Returns the stored form together with the raw key, which is shown
    /// to the caller once and cannot be recovered later.
    pub fn issue(request: IssueRequest, hasher: &KeyHasher) -> Result<(Credential, RawKey)> {
        Self::issue_at(request, hasher, Utc::now())
    }

    /// [`Self::issue`] with an explicit clock.
    pub fn issue_at(
        request: IssueRequest,
        hasher: &KeyHasher,
        now: DateTime<Utc>,
    ) -> Result<(Credential, RawKey)> {
        if request.domain_whitelist.len() > MAX_WHITELIST_DOMAINS {
            return Err(CredentialError::TooManyDomains {
                max: MAX_WHITELIST_DOMAINS,
            });
        }

        let raw = generate_secure_token(DEFAULT_TOKEN_BYTES);
        let key_prefix = raw[..PREFIX_LEN].to_string();
        let key_hash = hasher.hash_raw(&raw);

        let credential = Credential {
            id: Uuid::now_v7(),
            name: request.name,
            key_hash,
            key_prefix,
            domain_whitelist: request.domain_whitelist,
            allow_wildcard_subdomains: request.allow_wildcard_subdomains,
            rate_limits: request.rate_limits.unwrap_or_default(),
            is_active: true,
            expires_at: Some(
                request
                    .expires_at
                    .unwrap_or(now + Duration::days(ROTATION_DAYS)),
            ),
            last_used_at: None,
            rotated_from: None,
            rotated_at: None,
            usage: UsageCounters::new(now),
            created_by: request.created_by,
            notes: request.notes,
            tags: request.tags,
            created_at: now,
            updated_at: now,
        };

        Ok((credential, RawKey(raw)))
    }

    /// Check a supplied raw key against the stored digest.
    ///
    /// The fixed-length and prefix checks run first; the digest is only
    /// computed for plausible inputs, which bounds the cost of probing
    /// with garbage keys.
    pub fn verify_raw_key(&self, supplied: &str, hasher: &KeyHasher) -> bool {
        if supplied.len() != RAW_KEY_LEN || !supplied.starts_with(&self.key_prefix) {
            return false;
        }
        let computed = hasher.hash_raw(supplied);
        timing_safe_compare(computed.as_bytes(), self.key_hash.as_bytes())
    }

    /// Whether `origin` may present this credential.
    ///
    /// Inactive or expired credentials match nothing. Whitelist entries
    /// and the origin are normalised before comparison; an entry matches
    /// exactly, or — when it starts with `*.` and wildcarding is enabled —
    /// matches the base domain and any of its subdomains. An empty
    /// whitelist imposes no origin restriction.
    pub fn domain_allowed(&self, origin: &str, now: DateTime<Utc>) -> bool {
        if !self.is_active || self.is_expired(now) {
            return false;
        }
        if self.domain_whitelist.is_empty() {
            return true;
        }

        let origin = normalize_domain(origin);
        if origin.is_empty() {
            return false;
        }

        self.domain_whitelist.iter().any(|entry| {
            let entry = normalize_domain(entry);
            match entry.strip_prefix("*.") {
                Some(base) if self.allow_wildcard_subdomains => {
                    origin == base || origin.strip_suffix(base).is_some_and(|h| h.ends_with('.'))
                }
                _ => origin == entry,
            }
        })
    }

    /// `expires_at` is set and has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }

    /// Older than the rotation period.
    pub fn needs_rotation(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) >= Duration::days(ROTATION_DAYS)
    }

    /// Issue a replacement credential and deactivate this one.
    ///
    /// The replacement copies the whitelist, wildcard flag, rate limits
    /// and tags (gaining the `rotated` tag), and records this credential
    /// as its origin. This record stays in storage for audit; cleanup
    /// removes it after the retention window.
    pub fn rotate(
        &mut self,
        hasher: &KeyHasher,
        created_by: impl Into<String>,
    ) -> Result<(Credential, RawKey)> {
        self.rotate_at(hasher, created_by, Utc::now())
    }

    /// [`Self::rotate`] with an explicit clock.
    pub fn rotate_at(
        &mut self,
        hasher: &KeyHasher,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(Credential, RawKey)> {
        let mut tags = self.tags.clone();
        if !tags.iter().any(|t| t == ROTATED_TAG) {
            tags.push(ROTATED_TAG.to_string());
        }

        let request = IssueRequest {
            name: self.name.clone(),
            created_by: created_by.into(),
            domain_whitelist: self.domain_whitelist.clone(),
            allow_wildcard_subdomains: self.allow_wildcard_subdomains,
            rate_limits: Some(self.rate_limits.clone()),
            expires_at: None,
            notes: self.notes.clone(),
            tags,
        };

        let (mut replacement, raw) = Self::issue_at(request, hasher, now)?;
        replacement.rotated_from = Some(self.id);

        self.is_active = false;
        self.rotated_at = Some(now);
        self.updated_at = now;

        Ok((replacement, raw))
    }
}

/// Lowercase, strip the scheme and any trailing slash.
fn normalize_domain(raw: &str) -> String {
    let s = raw.trim().to_ascii_lowercase();
    let s = match s.split_once("://") {
        Some((_, rest)) => rest,
        None => s.as_str(),
    };
    s.strip_suffix('/').unwrap_or(s).to_string()
}
