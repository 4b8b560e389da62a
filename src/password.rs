//! Argon2id password hashing and verification.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password into a PHC string with a fresh random salt.
///
/// The same input yields a different string on every call; the salt is
/// embedded in the output.
///
/// # Errors
/// Returns an error if the hasher rejects its parameters, which does not
/// happen for the defaults used here.
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

/// Verify a password against a stored PHC string.
///
/// Fails closed: a malformed or truncated hash verifies as `false` rather
/// than erroring, since the hash column may carry attacker-visible input on
/// user update paths.
#[must_use]
pub fn verify(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hashed = hash("correct horse battery staple").unwrap();
        assert!(verify("correct horse battery staple", &hashed));
        assert!(!verify("wrong password", &hashed));
    }

    #[test]
    fn hash_is_salted() {
        let first = hash("pw1").unwrap();
        let second = hash("pw1").unwrap();
        assert_ne!(first, second);
        assert!(verify("pw1", &first));
        assert!(verify("pw1", &second));
    }

    #[test]
    fn verify_fails_closed_on_malformed_hash() {
        assert!(!verify("pw1", ""));
        assert!(!verify("pw1", "not-a-phc-string"));
        assert!(!verify("pw1", "$argon2id$v=19$truncated"));
    }
}
