//! Room code generation and normalization.
//!
//! Room codes are 6-character strings over Crockford's Base32 alphabet.
//! Normalization folds the characters Crockford aliases (O→0, I/L→1) so a
//! code read aloud or retyped still resolves to the same room.

use rand::Rng;

const CROCKFORD: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ"; // no I, L, O, U

pub const CODE_LEN: usize = 6;

/// Generate a random 6-character room code.
///
/// # Example
/// ```
/// let code = server::room_code::generate();
/// assert_eq!(code.len(), 6);
/// ```
pub fn generate() -> String {
    let mut rng = rand::rng();
    let mut s = String::with_capacity(CODE_LEN);
    for _ in 0..CODE_LEN {
        s.push(CROCKFORD[rng.random_range(0..CROCKFORD.len())] as char);
    }
    s
}

/// Canonicalize a client-supplied room code.
///
/// Uppercases, folds aliased characters, and rejects anything outside the
/// alphabet or outside 4..=10 characters. Returns a human-readable reason
/// on rejection.
pub fn normalize(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if !(4..=10).contains(&trimmed.len()) {
        return Err(format!(
            "room code must be 4 to 10 characters, got {}",
            trimmed.len()
        ));
    }
    let mut code = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        let folded = match ch.to_ascii_uppercase() {
            'O' => '0',
            'I' | 'L' => '1',
            up => up,
        };
        if !CROCKFORD.contains(&(folded as u8)) {
            return Err(format!("room code contains invalid character {ch:?}"));
        }
        code.push(folded);
    }
    Ok(code)
}
