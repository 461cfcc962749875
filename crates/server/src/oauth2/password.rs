//! Secret hashing and verification.
//!
//! Uses Argon2id for user passwords and OAuth2 client secrets alike.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;

/// Hash a secret using Argon2id.
///
/// Returns the PHC-formatted hash string suitable for storage.
pub fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a candidate against a stored hash.
///
/// A mismatch or an unparseable digest is a plain `false`, never an error.
pub fn verify_secret(digest: &str, candidate: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate an unguessable URL-safe token (256 bits of randomness).
///
/// Used for authorization codes and client secrets.
pub fn generate_token() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_secret() {
        let secret = "my-secure-password-123!";
        let hash = hash_secret(secret).expect("Failed to hash secret");

        assert!(hash.starts_with("$argon2"));
        assert!(verify_secret(&hash, secret));
        assert!(!verify_secret(&hash, "wrong-password"));
    }

    #[test]
    fn test_hash_produces_different_salts() {
        let hash1 = hash_secret("same-secret").expect("Failed to hash");
        let hash2 = hash_secret("same-secret").expect("Failed to hash");

        assert_ne!(hash1, hash2);
        assert!(verify_secret(&hash1, "same-secret"));
        assert!(verify_secret(&hash2, "same-secret"));
    }

    #[test]
    fn test_verify_invalid_hash_format() {
        assert!(!verify_secret("not-a-valid-hash", "password"));
        assert!(!verify_secret("", "password"));
        assert!(!verify_secret("$invalid$hash$format", "password"));
    }

    #[test]
    fn test_generate_token() {
        let token1 = generate_token().unwrap();
        let token2 = generate_token().unwrap();

        assert_ne!(token1, token2);
        assert!(!token1.contains('+'));
        assert!(!token1.contains('/'));
        assert!(!token1.contains('='));
        // 32 bytes base64url encoded
        assert_eq!(token1.len(), 43);
    }
}
