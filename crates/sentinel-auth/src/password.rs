//! Password hashing and verification using Argon2id.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use sentinel_core::error::FieldError;

use crate::error::AuthError;

fn with_pepper<'a>(password: &'a str, pepper: Option<&str>, buf: &'a mut String) -> &'a [u8] {
    match pepper {
        Some(p) => {
            *buf = format!("{p}{password}");
            buf.as_bytes()
        }
        None => password.as_bytes(),
    }
}

/// Hash a password with Argon2id using OWASP-recommended parameters
/// (m=19456 KiB, t=2, p=1) and a fresh random salt.
///
/// If a pepper is provided it is prepended to the password first.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, AuthError> {
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| AuthError::Crypto(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut buf = String::new();
    let input = with_pepper(password, pepper, &mut buf);

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| AuthError::Crypto(format!("password hash error: {e}")))?;

    Ok(hash.to_string())
}

/// Verify a plaintext password against an Argon2id PHC-format hash.
///
/// The comparison is constant-time. Returns `Ok(true)` on match,
/// `Ok(false)` on mismatch, or `Err(AuthError::Crypto)` if the stored hash
/// is malformed.
pub fn verify_password(password: &str, hash: &str, pepper: Option<&str>) -> Result<bool, AuthError> {
    let mut buf = String::new();
    let input = with_pepper(password, pepper, &mut buf);

    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

    // Parameters come from the PHC string, not from `Argon2::default()`.
    match Argon2::default().verify_password(input, &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}

/// Check a candidate password against the length policy.
pub fn validate_password_policy(password: &str, min_length: usize) -> Result<(), AuthError> {
    let mut errors = Vec::new();
    if password.trim().is_empty() {
        errors.push(FieldError::new("password", "must not be empty"));
    } else if password.chars().count() < min_length {
        errors.push(FieldError::new(
            "password",
            format!("must be at least {min_length} characters"),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::WeakPassword(errors))
    }
}
