//! Verification code generation and formatting.
//!
//! Codes are 6 symbols from a 32-character alphabet with the visually
//! ambiguous `0`, `O`, `I` and `1` removed. The canonical form is the bare
//! uppercase string; the display form splits it as `XXX-XXX`.

use rand::Rng;

/// Symbols a code may contain
pub const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a canonical code
pub const CODE_LEN: usize = 6;

/// Position of the dash in the display form
const SPLIT_AT: usize = 3;

/// Generate a fresh code from the thread-local generator
pub fn generate() -> String {
    generate_with(&mut rand::rng())
}

/// Generate a fresh code from the given generator
pub fn generate_with<R: Rng>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Canonical form: uppercase, everything outside `[A-Z0-9]` dropped.
///
/// Length is not checked; use [`is_well_formed`] before a lookup.
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

/// Display form `XXX-XXX`.
///
/// Input that does not normalize to exactly 6 characters is returned as-is.
pub fn format(input: &str) -> String {
    let canonical = normalize(input);
    if canonical.len() != CODE_LEN {
        return input.to_string();
    }
    let (head, tail) = canonical.split_at(SPLIT_AT);
    format!("{head}-{tail}")
}

/// True for a canonical code: right length, alphabet symbols only
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| ALPHABET.contains(&b))
}

/// Masked form for logs, e.g. `A7X***`
pub fn mask(code: &str) -> String {
    let visible: String = code.chars().take(SPLIT_AT).collect();
    format!("{visible}***")
}
