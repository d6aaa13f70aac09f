//! Password digests.
//!
//! Stored form is `hex(salt)$hex(sha256(salt || password))`. This keeps
//! passwords out of the database in clear text; it is not a slow KDF.

use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 3;

/// Produce a fresh salted digest for `password`.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    format!("{}${}", hex::encode(salt), digest(&salt, password))
}

/// Check `password` against a stored digest. Malformed digests never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, expected)) = stored.split_once('$') else {
        return false;
    };
    match hex::decode(salt_hex) {
        Ok(salt) => digest(&salt, password) == expected,
        Err(_) => false,
    }
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
