//! Operator password verification against an Argon2 PHC string.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;
use thiserror::Error;

/// Salt length in bytes (the PHC recommended 16).
const SALT_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Returns `Ok(false)` for a wrong password, `Err` for an unusable hash.
pub fn verify_admin_password(phc_hash: &str, password: &str) -> Result<bool, PasswordError> {
    let parsed =
        PasswordHash::new(phc_hash.trim()).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::InvalidHash(e.to_string())),
    }
}

/// Produce a PHC string for configuring `admin_password_hash`.
pub fn hash_admin_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| PasswordError::Hashing(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}
