//! Short public codes for `send` exports.

use uuid::Uuid;

/// Code length in characters.
pub const PUBLIC_CODE_LEN: usize = 8;

// No 0/O, 1/I/L, or U.
const ALPHABET: &[u8; 30] = b"23456789ABCDEFGHJKMNPQRSTVWXYZ";

// Largest multiple of the alphabet size that fits in a byte. Bytes at or
// above it are skipped so every character is equally likely.
const ACCEPT_BELOW: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// Fresh random code, e.g. `K7QX2MZH`.
pub fn generate_public_code() -> String {
    code_from_bytes(random_bytes())
}

/// Endless uniform bytes from v4 uuids.
fn random_bytes() -> impl Iterator<Item = u8> {
    std::iter::repeat_with(|| Uuid::new_v4().into_bytes()).flat_map(|bytes| {
        bytes
            .into_iter()
            .enumerate()
            // Bytes 6 and 8 carry the version and variant bits.
            .filter(|(index, _)| *index != 6 && *index != 8)
            .map(|(_, byte)| byte)
    })
}

/// Up to [`PUBLIC_CODE_LEN`] characters from the accepted bytes of `bytes`.
fn code_from_bytes(bytes: impl IntoIterator<Item = u8>) -> String {
    bytes
        .into_iter()
        .filter(|b| *b < ACCEPT_BELOW)
        .take(PUBLIC_CODE_LEN)
        .map(|b| ALPHABET[usize::from(b) % ALPHABET.len()] as char)
        .collect()
}

/// True when `code` could have come from [`generate_public_code`].
pub fn is_valid_public_code(code: &str) -> bool {
    code.len() == PUBLIC_CODE_LEN
        && code.bytes().all(|b| ALPHABET.contains(&b))
}
