//! Authenticated symmetric encryption (AES-256-GCM).
//!
//! Blobs are self-describing: `nonce || ciphertext || tag`, base64
//! encoded. A fresh random nonce is drawn per call, so encrypting the
//! same plaintext twice yields different output.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use data_encoding::BASE64;
use rand::RngCore;

use crate::error::{CryptoError, Result};
use crate::keyring::Keyring;

/// AES-GCM nonce size in bytes.
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag size in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under the keyring's derived key.
///
/// Returns a base64 blob containing the nonce, ciphertext and
/// authentication tag. Fails only when key material is unavailable.
pub fn encrypt(keyring: &Keyring, plaintext: &str) -> Result<String> {
    let key = keyring.key()?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    // The aead API appends the tag to the ciphertext.
    let sealed = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::Encryption)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&sealed);

    Ok(BASE64.encode(&blob))
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Any malformed, truncated or tampered input fails with
/// [`CryptoError::Decryption`]; partial plaintext is never returned.
pub fn decrypt(keyring: &Keyring, blob: &str) -> Result<String> {
    let key = keyring.key()?;

    let raw = BASE64
        .decode(blob.as_bytes())
        .map_err(|_| CryptoError::Decryption("malformed base64"))?;

    if raw.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Decryption("truncated blob"));
    }

    let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), sealed)
        .map_err(|_| CryptoError::Decryption("authentication failed"))?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption("invalid utf-8 payload"))
}
