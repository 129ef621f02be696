use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};

/// Random bytes in a session token
const TOKEN_BYTES: usize = 32;

/// Fresh session token: 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Storage key for a session token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Six-digit login code, zero padded.
pub fn generate_login_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

/// Storage key for a login code, bound to the email it was sent to.
pub fn hash_login_code(email: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hasher.update(b":");
    hasher.update(code.trim().as_bytes());
    hex::encode(hasher.finalize())
}
