//! Cryptographic primitives for the booking platform.
//!
//! This crate provides the small, stateless building blocks the
//! credential subsystem is made of:
//! - Authenticated symmetric encryption (AES-256-GCM, base64 blobs)
//! - Salted SHA-256 fingerprinting (64 hex characters)
//! - Secure random token generation
//! - Public booking reference codes (confusable-free alphabet)
//! - Constant-time comparison
//!
//! # Key material
//!
//! Encryption needs a process-wide key derived from configuration. The
//! [`Keyring`] makes that explicit: construct one from the environment
//! (or inject a secret directly in tests) and pass it to the cipher
//! functions. Derivation is lazy — a missing `ENCRYPTION_KEY` only fails
//! on the first crypto call — and deterministic, so a restarted process
//! can decrypt data written before the restart.
//!
//! # Example
//!
//! ```rust
//! use crypto_core::{Keyring, encrypt, decrypt};
//!
//! let keyring = Keyring::from_secret("example-secret", None);
//! let blob = encrypt(&keyring, "guest notes").unwrap();
//! assert_eq!(decrypt(&keyring, &blob).unwrap(), "guest notes");
//! ```

mod cipher;
mod compare;
mod error;
mod hash;
mod keyring;
mod refcode;
mod token;

// Public re-exports
pub use cipher::{NONCE_LEN, TAG_LEN, decrypt, encrypt};
pub use compare::timing_safe_compare;
pub use error::{CryptoError, Result};
pub use hash::{DIGEST_HEX_LEN, digest};
pub use keyring::{DERIVED_KEY_LEN, ENCRYPTION_KEY_VAR, ENCRYPTION_SALT_VAR, Keyring};
pub use refcode::{
    REFERENCE_ALPHABET, REFERENCE_LEN, REFERENCE_SENTINEL, generate_reference_number,
    is_valid_reference,
};
pub use token::{DEFAULT_TOKEN_BYTES, generate_secure_token};
