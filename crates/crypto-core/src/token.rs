//! Secure random token generation.

use rand::RngCore;

/// Default secret size: 32 bytes = 256 bits = 64 hex characters.
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Generate `byte_length` cryptographically random bytes, hex encoded.
///
/// The returned string has length `2 * byte_length`.
pub fn generate_secure_token(byte_length: usize) -> String {
    let mut buf = vec![0u8; byte_length];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}
