//! Correlation-id generation.

use rand::RngCore;

/// Generate a correlation id from `bytes` random bytes, rendered as
/// lowercase hex (`bytes = 9` yields 18 characters).
///
/// Draws from [`rand::rng`], which is seeded from the operating system's
/// entropy source.
pub fn generate_id(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}
