//! Process key-material configuration.
//!
//! The symmetric key used by [`crate::cipher`] is derived from operator
//! configuration, not generated: restarts must be able to decrypt data
//! written by earlier runs. The `Keyring` is an explicit value passed to
//! the functions that need it, so tests can construct isolated instances
//! instead of fighting over a hidden global.

use std::sync::RwLock;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// Environment variable holding the master secret. Required.
pub const ENCRYPTION_KEY_VAR: &str = "ENCRYPTION_KEY";
/// Environment variable holding an optional derivation salt.
pub const ENCRYPTION_SALT_VAR: &str = "ENCRYPTION_SALT";

/// Size of the derived AES-256 key in bytes.
pub const DERIVED_KEY_LEN: usize = 32;

enum KeySource {
    /// Read `key_var`/`salt_var` from the environment on first use.
    Env { key_var: String, salt_var: String },
    /// Directly injected material (tests, embedded callers).
    Static {
        secret: Zeroizing<String>,
        salt: Option<String>,
    },
}

/// Holder for the derived symmetric key.
///
/// Construction is cheap and infallible; the key is derived on first use.
/// A missing or empty secret surfaces as [`CryptoError::Configuration`]
/// at that point, not at startup. Deliberately not `Debug`: neither the
/// secret nor the derived key should ever hit a log line.
pub struct Keyring {
    source: KeySource,
    derived: RwLock<Option<Zeroizing<[u8; DERIVED_KEY_LEN]>>>,
}

impl Keyring {
    /// Keyring backed by the standard `ENCRYPTION_KEY` / `ENCRYPTION_SALT`
    /// environment variables.
    pub fn from_env() -> Self {
        Self::from_env_vars(ENCRYPTION_KEY_VAR, ENCRYPTION_SALT_VAR)
    }

    /// Keyring backed by custom environment variable names. Lets tests
    /// point at variables nothing else touches.
    pub fn from_env_vars(key_var: impl Into<String>, salt_var: impl Into<String>) -> Self {
        Self {
            source: KeySource::Env {
                key_var: key_var.into(),
                salt_var: salt_var.into(),
            },
            derived: RwLock::new(None),
        }
    }

    /// Keyring with directly injected material, bypassing the environment.
    pub fn from_secret(secret: impl Into<String>, salt: Option<&str>) -> Self {
        Self {
            source: KeySource::Static {
                secret: Zeroizing::new(secret.into()),
                salt: salt.map(str::to_owned),
            },
            derived: RwLock::new(None),
        }
    }

    /// The derived 32-byte key, computing and caching it on first call.
    pub fn key(&self) -> Result<[u8; DERIVED_KEY_LEN]> {
        if let Some(key) = self.derived.read().expect("keyring lock poisoned").as_ref() {
            return Ok(**key);
        }

        let (secret, salt) = self.material()?;
        let key = derive_key(&secret, salt.as_deref());

        let mut guard = self.derived.write().expect("keyring lock poisoned");
        *guard = Some(Zeroizing::new(key));
        Ok(key)
    }

    /// Drop the cached derived key. The next use re-derives from the
    /// configured source; tests use this between scenarios.
    pub fn reset(&self) {
        let mut guard = self.derived.write().expect("keyring lock poisoned");
        *guard = None;
    }

    fn material(&self) -> Result<(Zeroizing<String>, Option<String>)> {
        match &self.source {
            KeySource::Env { key_var, salt_var } => {
                let secret = std::env::var(key_var)
                    .ok()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| CryptoError::Configuration(key_var.clone()))?;
                let salt = std::env::var(salt_var).ok().filter(|s| !s.is_empty());
                Ok((Zeroizing::new(secret), salt))
            }
            KeySource::Static { secret, salt } => {
                if secret.is_empty() {
                    return Err(CryptoError::Configuration("injected secret".to_string()));
                }
                Ok((secret.clone(), salt.clone()))
            }
        }
    }
}

/// SHA-256(secret || salt). Deterministic so a restarted process derives
/// the same key and can decrypt previously written blobs.
fn derive_key(secret: &str, salt: Option<&str>) -> [u8; DERIVED_KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    if let Some(salt) = salt {
        hasher.update(salt.as_bytes());
    }
    let digest = hasher.finalize();

    let mut key = [0u8; DERIVED_KEY_LEN];
    key.copy_from_slice(&digest);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let a = Keyring::from_secret("master-secret", Some("pepper"));
        let b = Keyring::from_secret("master-secret", Some("pepper"));
        assert_eq!(a.key().unwrap(), b.key().unwrap());
    }

    #[test]
    fn test_salt_changes_derived_key() {
        let plain = Keyring::from_secret("master-secret", None);
        let salted = Keyring::from_secret("master-secret", Some("pepper"));
        assert_ne!(plain.key().unwrap(), salted.key().unwrap());
    }

    #[test]
    fn test_missing_env_fails_on_first_use_not_construction() {
        let keyring = Keyring::from_env_vars("KEYRING_TEST_UNSET_KEY", "KEYRING_TEST_UNSET_SALT");
        let err = keyring.key().unwrap_err();
        assert!(matches!(err, CryptoError::Configuration(_)));
    }

    #[test]
    fn test_empty_secret_is_a_configuration_error() {
        let keyring = Keyring::from_secret("", None);
        assert!(matches!(
            keyring.key(),
            Err(CryptoError::Configuration(_))
        ));
    }

    #[test]
    fn test_reset_re_derives_same_key() {
        let keyring = Keyring::from_secret("master-secret", Some("pepper"));
        let before = keyring.key().unwrap();
        keyring.reset();
        assert_eq!(keyring.key().unwrap(), before);
    }

    #[test]
    fn test_env_sourced_key() {
        // Variable name unique to this test to avoid cross-test races.
        unsafe { std::env::set_var("KEYRING_TEST_ENV_KEY", "env-secret") };
        let keyring = Keyring::from_env_vars("KEYRING_TEST_ENV_KEY", "KEYRING_TEST_ENV_SALT");
        let from_env = keyring.key().unwrap();

        let reference = Keyring::from_secret("env-secret", None);
        assert_eq!(from_env, reference.key().unwrap());
    }
}
