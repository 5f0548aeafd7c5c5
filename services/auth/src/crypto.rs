//! Hashing and secret-generation primitives
//!
//! Passwords and single-use tokens share the same treatment: a salted argon2
//! hash is stored, the raw value is compared with the library's constant-time
//! verify, and raw secrets never touch the database.

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::{Rng, distributions::Alphanumeric};

/// Length of a raw single-use token
pub const TOKEN_LENGTH: usize = 64;

/// Length of the clear-text lookup prefix stored alongside a token hash
pub const PREFIX_LENGTH: usize = 8;

/// Generate a cryptographically random single-use secret
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Leading characters of a raw token, stored in clear text for indexed lookup
///
/// The prefix narrows the candidate set; it is never sufficient for a match
/// on its own.
pub fn token_prefix(raw: &str) -> &str {
    &raw[..raw.len().min(PREFIX_LENGTH)]
}

/// Hash a password or raw token into a salted PHC string
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))?
        .to_string();

    Ok(hash)
}

/// Verify a password or raw token against a stored PHC hash
pub fn verify_secret(secret: &str, stored_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse stored hash: {}", e))?;

    let argon2 = Argon2::default();
    Ok(argon2
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Burn the same work as a real verification when the subject does not exist
///
/// Keeps unknown-email and wrong-password paths indistinguishable by timing.
pub fn dummy_verify(secret: &str) {
    let _ = hash_secret(secret);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_long_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert_eq!(b.len(), TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefix_is_eight_chars() {
        let raw = generate_token();
        let prefix = token_prefix(&raw);
        assert_eq!(prefix.len(), PREFIX_LENGTH);
        assert!(raw.starts_with(prefix));
    }

    #[test]
    fn test_hash_and_verify_round_trip() -> anyhow::Result<()> {
        let raw = generate_token();
        let hash = hash_secret(&raw)?;

        // The stored form never contains the raw secret.
        assert!(!hash.contains(&raw));
        assert!(verify_secret(&raw, &hash)?);
        assert!(!verify_secret("not-the-token", &hash)?);
        Ok(())
    }

    #[test]
    fn test_same_secret_hashes_differently() -> anyhow::Result<()> {
        // Salted hashing: equal inputs must not produce equal PHC strings.
        let first = hash_secret("Abc123!")?;
        let second = hash_secret("Abc123!")?;
        assert_ne!(first, second);
        assert!(verify_secret("Abc123!", &first)?);
        assert!(verify_secret("Abc123!", &second)?);
        Ok(())
    }
}
