//! Argon2 password hashing.
//!
//! Hashing is CPU-bound, so both operations run on the blocking pool.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::GatewayError;

/// Hashes `password` into an Argon2id PHC string.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] if hashing fails or the blocking task
/// is cancelled.
pub async fn hash_password(password: String) -> Result<String, GatewayError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| GatewayError::Internal(format!("failed to hash password: {e}")))
    })
    .await
    .map_err(|e| GatewayError::Internal(e.to_string()))?
}

/// Checks `password` against a stored PHC hash.
///
/// A malformed stored hash verifies as `false`.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] if the blocking task is cancelled.
pub async fn verify_password(password: String, stored_hash: String) -> Result<bool, GatewayError> {
    tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&stored_hash) else {
            tracing::warn!("stored password hash is not a valid PHC string");
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .map_err(|e| GatewayError::Internal(e.to_string()))
}
