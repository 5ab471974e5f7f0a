//! Salted SHA-256 fingerprinting.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Compute the hex digest of `data`, optionally salted.
///
/// Deterministic: the same `(data, salt)` pair always produces the same
/// 64-character digest. The salt is folded in before the data so that
/// digests of the same data under different salts are unrelated.
pub fn digest(data: &str, salt: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    if let Some(salt) = salt {
        hasher.update(salt.as_bytes());
    }
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_64_hex_chars() {
        for data in ["", "x", "a longer input with spaces", "ünïcode"] {
            let d = digest(data, None);
            assert_eq!(d.len(), DIGEST_HEX_LEN);
            assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_digest_deterministic() {
        assert_eq!(digest("payload", Some("s1")), digest("payload", Some("s1")));
        assert_eq!(digest("payload", None), digest("payload", None));
    }

    #[test]
    fn test_different_salts_diverge() {
        assert_ne!(digest("payload", Some("s1")), digest("payload", Some("s2")));
        assert_ne!(digest("payload", Some("s1")), digest("payload", None));
    }

    #[test]
    fn test_different_data_diverges() {
        assert_ne!(digest("payload-a", None), digest("payload-b", None));
    }
}
