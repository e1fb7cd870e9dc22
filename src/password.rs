//! Password hashing and verification.
//!
//! Plaintext passwords exist only for the duration of a single hash or
//! verify call; callers store and log the hash exclusively.

use thiserror::Error;

/// Minimum accepted password length, enforced by callers before hashing.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum Error {
    #[error("password hashing failed")]
    HashingFailed(#[source] bcrypt::BcryptError),
}

/// Hash a plaintext password with bcrypt at the library default cost.
///
/// # Errors
///
/// Returns [`Error::HashingFailed`] only on internal failure (e.g. the
/// system randomness source); input content never fails here.
pub fn hash(plaintext: &str) -> Result<String, Error> {
    bcrypt::hash(plaintext, bcrypt::DEFAULT_COST).map_err(Error::HashingFailed)
}

/// Check a plaintext guess against a stored hash.
///
/// Malformed hashes compare as non-matching rather than surfacing a distinct
/// error path, so the response shape does not depend on stored data.
#[must_use]
pub fn verify(stored_hash: &str, plaintext: &str) -> bool {
    bcrypt::verify(plaintext, stored_hash).unwrap_or(false)
}
