//! Error types for credential lifecycle operations.
//!
//! Per-request validation failures (bad key, wrong domain, rate limited)
//! are not errors — they come back as denial decisions from the gate.
//! This enum covers the systemic conditions: broken configuration,
//! storage failures, and exhausted reference allocation.

use thiserror::Error;

/// Errors that can occur in the credential subsystem.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Key material problem bubbled up from the crypto layer. Fatal.
    #[error(transparent)]
    Crypto(#[from] crypto_core::CryptoError),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// No credential or reference matched the lookup.
    #[error("not found")]
    NotFound,

    /// Reference-number generation collided with existing codes on every
    /// attempt. Fatal for the request; retryable by issuing a new one.
    #[error("reference allocation exhausted after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    /// Externally supplied reference code does not have the expected shape.
    #[error("malformed booking reference")]
    InvalidReference,

    /// Issuance rejected: domain whitelist larger than the allowed maximum.
    #[error("domain whitelist exceeds {max} entries")]
    TooManyDomains { max: usize },
}

/// Result type alias for credential operations.
pub type Result<T> = std::result::Result<T, CredentialError>;
