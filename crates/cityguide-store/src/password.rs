//! Password hashing.
//!
//! New hashes are bcrypt. Rows written by older builds hold a bare hex
//! SHA-256 digest; those still verify and are reported as needing a rehash.

use cityguide_core::{Error, Result};
use sha2::{Digest, Sha256};

/// bcrypt only reads this many bytes of input.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Hash a plaintext password with a fresh salt.
///
/// Passwords longer than [`MAX_PASSWORD_BYTES`] are rejected with
/// `Error::InvalidInput`; bcrypt would silently ignore the tail.
pub fn hash_password(password: &str) -> Result<String> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(Error::InvalidInput(format!(
            "password is longer than {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    pwhash::bcrypt::hash(password).map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))
}

/// Check a plaintext password against a stored hash of either format.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if is_legacy_hash(stored) {
        let digest = hex::encode(Sha256::digest(password.as_bytes()));
        return digest.eq_ignore_ascii_case(stored);
    }
    pwhash::bcrypt::verify(password, stored)
}

/// Whether the stored hash should be replaced after a successful login.
pub fn needs_rehash(stored: &str) -> bool {
    is_legacy_hash(stored)
}

/// Unsalted hex SHA-256 digest written by older builds.
pub fn is_legacy_hash(stored: &str) -> bool {
    stored.len() == 64 && stored.bytes().all(|b| b.is_ascii_hexdigit())
}
