//! Currency code string generation.

use rand::Rng;

use super::models::CodeKind;

/// Characters of the random part
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of the random part
pub const CODE_SUFFIX_LEN: usize = 8;

/// Generate `PREFIX-XXXXXXXX`
pub fn generate_code(kind: CodeKind) -> String {
    generate_code_with(&mut rand::rng(), kind)
}

/// Generate a code from a caller-supplied RNG
pub fn generate_code_with<R: Rng + ?Sized>(rng: &mut R, kind: CodeKind) -> String {
    let suffix: String = (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", kind.prefix(), suffix)
}

/// Normalise user input: trim surrounding whitespace
pub fn normalize_code(input: &str) -> &str {
    input.trim()
}
