//! Account passwords
//!
//! Stored as Argon2 PHC strings. Login always pays for exactly one verify:
//! against the account's hash when the handle exists, against
//! [`dummy_hash`] when it does not, so response time does not reveal which
//! handles are registered.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::ImpError;

/// Hash a new account's password with a fresh salt
pub fn hash_password(password: &str) -> Result<String, ImpError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ImpError::Auth(format!("Failed to hash password: {e}")))
}

/// Whether `password` matches a stored hash. `Err` only for an unreadable hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, ImpError> {
    let stored = PasswordHash::new(hash)
        .map_err(|e| ImpError::Auth(format!("Unreadable password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &stored)
        .is_ok())
}

/// A valid hash of a random secret, verified against when a login names no
/// known account so the miss costs as much as a wrong password
pub fn dummy_hash() -> Result<String, ImpError> {
    hash_password(&super::token::random_token())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_password_round_trip() {
        let hash = hash_password("long-enough-password").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("long-enough-password", &hash).unwrap());
        assert!(!verify_password("Long-enough-password", &hash).unwrap());
    }

    #[test]
    fn test_unreadable_stored_hash_is_an_error() {
        assert!(matches!(
            verify_password("password", "plaintext"),
            Err(ImpError::Auth(_))
        ));
    }

    #[test]
    fn test_dummy_hash_is_verifiable() {
        let dummy = dummy_hash().unwrap();
        assert!(!verify_password("anything", &dummy).unwrap());
    }
}
