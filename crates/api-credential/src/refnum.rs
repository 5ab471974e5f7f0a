//! Globally-unique booking reference allocation.
//!
//! The generator is probabilistic; global uniqueness belongs to the
//! storage layer's unique index. The allocator retries candidates
//! against an injected existence predicate to recover from collisions
//! (including races against concurrent allocators), and gives up loudly
//! when attempts run out.

use std::time::Duration;

use crypto_core::{generate_reference_number, is_valid_reference};

use crate::error::{CredentialError, Result};

/// Retry budget when every candidate keeps colliding.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// Pause between collision retries. Injected so tests run with zero
/// delay and production can spread bursts without branching on an
/// environment name.
pub trait RetryDelay {
    fn pause(&self, attempt: u32);
}

/// No pause at all.
pub struct NoDelay;

impl RetryDelay for NoDelay {
    fn pause(&self, _attempt: u32) {}
}

/// Flat pause between attempts.
pub struct FixedDelay {
    pub per_attempt: Duration,
}

impl RetryDelay for FixedDelay {
    fn pause(&self, _attempt: u32) {
        std::thread::sleep(self.per_attempt);
    }
}

/// Allocates reference codes that are unique in storage.
pub struct ReferenceAllocator {
    max_attempts: u32,
    delay: Box<dyn RetryDelay + Send + Sync>,
}

impl Default for ReferenceAllocator {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Box::new(FixedDelay {
                per_attempt: Duration::from_millis(25),
            }),
        }
    }
}

impl ReferenceAllocator {
    pub fn new(max_attempts: u32, delay: impl RetryDelay + Send + Sync + 'static) -> Self {
        Self {
            max_attempts,
            delay: Box::new(delay),
        }
    }

    /// One fresh candidate, shape-checked.
    pub fn generate(&self) -> String {
        let code = generate_reference_number();
        debug_assert!(is_valid_reference(&code));
        code
    }

    /// Allocate a code not present in storage.
    ///
    /// `exists` is the storage-backed predicate. Collisions are retried
    /// up to the attempt budget; exhaustion is an error that always
    /// propagates to the caller.
    pub fn generate_unique<F>(&self, mut exists: F) -> Result<String>
    where
        F: FnMut(&str) -> Result<bool>,
    {
        for attempt in 1..=self.max_attempts {
            let candidate = self.generate();
            if !exists(&candidate)? {
                return Ok(candidate);
            }
            log::warn!(
                "reference collision on attempt {attempt}/{}",
                self.max_attempts
            );
            if attempt < self.max_attempts {
                self.delay.pause(attempt);
            }
        }
        Err(CredentialError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Validate a reference arriving from external input (URLs, emails,
/// phone transcriptions). Trims and uppercases before applying the same
/// shape check used at generation time.
pub fn parse_reference(input: &str) -> Result<String> {
    let code = input.trim().to_ascii_uppercase();
    if !is_valid_reference(&code) {
        return Err(CredentialError::InvalidReference);
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn test_allocator() -> ReferenceAllocator {
        ReferenceAllocator::new(10, NoDelay)
    }

    #[test]
    fn test_first_candidate_wins_without_collisions() {
        let allocator = test_allocator();
        let code = allocator.generate_unique(|_| Ok(false)).unwrap();
        assert!(is_valid_reference(&code));
    }

    #[test]
    fn test_retries_until_a_free_code() {
        let allocator = test_allocator();
        let calls = Cell::new(0u32);
        let code = allocator
            .generate_unique(|_| {
                calls.set(calls.get() + 1);
                Ok(calls.get() <= 3) // first three candidates "taken"
            })
            .unwrap();
        assert_eq!(calls.get(), 4);
        assert!(is_valid_reference(&code));
    }

    #[test]
    fn test_exhaustion_propagates() {
        let allocator = test_allocator();
        let result = allocator.generate_unique(|_| Ok(true));
        assert!(matches!(
            result,
            Err(CredentialError::AllocationExhausted { attempts: 10 })
        ));
    }

    #[test]
    fn test_predicate_errors_propagate() {
        let allocator = test_allocator();
        let result = allocator.generate_unique(|_| Err(CredentialError::NotFound));
        assert!(matches!(result, Err(CredentialError::NotFound)));
    }

    #[test]
    fn test_parse_reference_normalises_and_validates() {
        assert_eq!(parse_reference("  w2345678 ").unwrap(), "W2345678");
        assert_eq!(parse_reference("WABCDEFG").unwrap(), "WABCDEFG");

        assert!(parse_reference("").is_err());
        assert!(parse_reference("12345678").is_err());
        assert!(parse_reference("WI234567").is_err()); // excluded glyph
        assert!(parse_reference("W234567").is_err()); // short
    }
}
