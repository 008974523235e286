//! Password hashing and verification using Argon2
//!
//! Uses the argon2id variant with default parameters. Hashing is
//! intentionally slow; callers on the request path run it through
//! `spawn_blocking` so it never starves token verification.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::WicketError;

/// Hash a plaintext password.
///
/// Returns the PHC-formatted string carrying the salt and parameters.
/// Fails only on internal entropy/resource problems.
pub fn hash(plaintext: &str) -> Result<String, WicketError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| WicketError::Internal(format!("failed to hash password: {e}")))
}

/// Verify a plaintext password against a stored PHC hash.
///
/// A mismatch is `Ok(false)`; only a malformed stored hash is an error.
pub fn verify(plaintext: &str, stored: &str) -> Result<bool, WicketError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| WicketError::Internal(format!("stored password hash is malformed: {e}")))?;

    Ok(Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let digest = hash("correct-horse-battery-staple").unwrap();
        assert!(digest.starts_with("$argon2"));

        assert!(verify("correct-horse-battery-staple", &digest).unwrap());
        assert!(!verify("wrong-password", &digest).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let first = hash("same-password").unwrap();
        let second = hash("same-password").unwrap();
        assert_ne!(first, second);

        assert!(verify("same-password", &first).unwrap());
        assert!(verify("same-password", &second).unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        assert!(verify("password", "not-a-phc-string").is_err());
    }
}
