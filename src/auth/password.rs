//! Argon2id password hashing.
//!
//! New hashes are always Argon2id. Accounts created before the move still carry
//! bcrypt hashes (`$2a$`, `$2b$`, `$2y$`); those verify through `bcrypt` and
//! are reported by [`needs_rehash`] so login can upgrade them.
//!
//! Hashing is CPU bound, so the async helpers move the work onto the blocking
//! pool instead of stalling a runtime worker.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash `password` into a PHC string.
///
/// # Errors
/// Returns an error if Argon2 rejects the input.
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash password: {e}"))
}

const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

fn is_bcrypt(stored: &str) -> bool {
    BCRYPT_PREFIXES.iter().any(|prefix| stored.starts_with(prefix))
}

/// Whether `stored` uses a legacy scheme and should be replaced with Argon2id.
#[must_use]
pub fn needs_rehash(stored: &str) -> bool {
    is_bcrypt(stored)
}

/// Check `password` against a stored hash. Unparseable hashes never match.
#[must_use]
pub fn verify(password: &str, stored: &str) -> bool {
    if is_bcrypt(stored) {
        return bcrypt::verify(password, stored).unwrap_or(false);
    }

    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// # Errors
/// Returns an error if hashing fails or the blocking task panics.
pub async fn hash_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash(&password))
        .await
        .context("password hashing task failed")?
}

/// # Errors
/// Returns an error if the blocking task panics.
pub async fn verify_blocking(password: String, stored: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify(&password, &stored))
        .await
        .context("password verification task failed")
}
