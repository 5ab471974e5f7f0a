//! Public booking reference codes.
//!
//! References are short codes read over the phone and typed by guests, so
//! the alphabet drops the visually confusable glyphs `I`, `O` and `1`.
//! The leading sentinel makes codes recognisable at a glance and keeps
//! them from ever parsing as a number.

use rand::Rng;

/// Total code length, sentinel included.
pub const REFERENCE_LEN: usize = 8;
/// Constant first character of every reference.
pub const REFERENCE_SENTINEL: char = 'W';
/// Permitted characters after the sentinel. No `I`, `O` or `1`.
pub const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ023456789";

/// Generate a fresh 8-character reference code.
///
/// Uniqueness is probabilistic only; callers needing global uniqueness
/// must check candidates against storage.
pub fn generate_reference_number() -> String {
    let mut rng = rand::rngs::OsRng;
    let mut code = String::with_capacity(REFERENCE_LEN);
    code.push(REFERENCE_SENTINEL);
    for _ in 1..REFERENCE_LEN {
        let idx = rng.gen_range(0..REFERENCE_ALPHABET.len());
        code.push(REFERENCE_ALPHABET[idx] as char);
    }
    code
}

/// Check that `code` has the exact shape produced by
/// [`generate_reference_number`]. Applied to generated candidates and to
/// externally supplied references alike.
pub fn is_valid_reference(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == REFERENCE_LEN
        && bytes[0] == REFERENCE_SENTINEL as u8
        && bytes[1..].iter().all(|b| REFERENCE_ALPHABET.contains(b))
}
