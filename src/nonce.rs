use rand::Rng;

/// Nonce entropy in bytes (128 bits).
pub const NONCE_BYTES: usize = 16;

/// Generates a cryptographically random SSO nonce.
///
/// Returns a 32-character lowercase hex string (16 random bytes).
#[must_use]
pub fn generate_nonce() -> String {
    let random_bytes: [u8; NONCE_BYTES] = rand::rng().random();
    hex::encode(random_bytes)
}
