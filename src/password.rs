//! Salted password hashing and constant-time verification.
//!
//! Accounts created through an external identity may have no password at
//! all; the orchestrator routes those to the forced password-setup page
//! after login.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

/// Hash a password with a fresh random salt.
///
/// Output format is `"{salt}${digest}"`, both parts base64-encoded.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    let digest = digest_with_salt(&salt, password);
    format!("{}${}", BASE64.encode(salt), BASE64.encode(digest))
}

/// Verify a password against a stored hash in constant time.
///
/// Any malformed stored value verifies as `false` rather than erroring;
/// a mismatch and a corrupt hash must be indistinguishable to callers.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_b64, digest_b64)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (BASE64.decode(salt_b64), BASE64.decode(digest_b64)) else {
        return false;
    };
    let actual = digest_with_salt(&salt, password);
    constant_time_eq::constant_time_eq(&actual, &expected)
}

fn digest_with_salt(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let stored = hash_password("correct horse battery staple");
        assert!(verify_password("correct horse battery staple", &stored));
        assert!(!verify_password("correct horse battery stale", &stored));
    }

    #[test]
    fn test_same_password_hashes_differently() {
        // Fresh salt per hash.
        assert_ne!(hash_password("secret"), hash_password("secret"));
    }

    #[test]
    fn test_malformed_stored_value_never_verifies() {
        assert!(!verify_password("secret", ""));
        assert!(!verify_password("secret", "no-dollar-sign"));
        assert!(!verify_password("secret", "!!!$???"));
    }
}
