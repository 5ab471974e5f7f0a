//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur in the crypto primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Required key material is missing or empty. Fatal: callers should
    /// refuse to serve authenticated traffic until configuration is fixed.
    #[error("missing key material: {0} is not set")]
    Configuration(String),

    /// The AEAD backend refused to seal the plaintext (only reachable for
    /// absurdly oversized inputs).
    #[error("encryption failed")]
    Encryption,

    /// Ciphertext could not be decrypted (malformed, truncated, or
    /// tampered). Recoverable: the caller decides what to do with the blob.
    #[error("decryption failed: {0}")]
    Decryption(&'static str),
}

/// Result type alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
