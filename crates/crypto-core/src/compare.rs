//! Constant-time comparison.

use subtle::ConstantTimeEq;

/// Compare two byte strings in constant time.
///
/// Inputs of unequal length return `false` immediately, which leaks the
/// length through timing. Stored digests and supplied digests here are
/// always fixed-width, so the only thing an early return reveals is that
/// the input was malformed; kept as-is rather than padded.
pub fn timing_safe_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_inputs_match() {
        assert!(timing_safe_compare(b"same-bytes", b"same-bytes"));
    }

    #[test]
    fn test_empty_inputs_match() {
        assert!(timing_safe_compare(b"", b""));
    }

    #[test]
    fn test_unequal_inputs_do_not_match() {
        assert!(!timing_safe_compare(b"same-bytes", b"same-bytez"));
    }

    #[test]
    fn test_unequal_lengths_do_not_match() {
        assert!(!timing_safe_compare(b"short", b"a longer input"));
        assert!(!timing_safe_compare(b"", b"x"));
    }
}
