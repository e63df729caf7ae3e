//! Secret hashing: argon2id for passwords, SHA-256 digests for tokens.
//!
//! Passwords get salted, slow, one-way PHC strings. Token digests are
//! deterministic on purpose: the digest of a presented token must be usable
//! inside a conditional `UPDATE ... WHERE x_token_hash = $n`, which rules out
//! salted hashing for them. Raw tokens are high-entropy signed JWTs, so a
//! plain digest is enough to keep the stored form non-replayable.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version,
    password_hash::{PasswordHasher, SaltString, rand_core},
};
use sha2::{Digest, Sha256};

fn argon2() -> Result<Argon2<'static>> {
    Ok(Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(15000, 2, 1, None).map_err(|err| anyhow!("argon2 params: {err}"))?,
    ))
}

/// Hash a password into a salted PHC string on the blocking pool.
pub(super) async fn hash_password(password: String) -> Result<String> {
    let current_span = tracing::Span::current();
    tokio::task::spawn_blocking(move || {
        current_span.in_scope(move || {
            let salt = SaltString::generate(rand_core::OsRng);
            argon2()?
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|err| anyhow!("failed to hash password: {err}"))
        })
    })
    .await
    .context("password hashing task failed")?
}

/// Check a candidate password against a stored PHC string on the blocking
/// pool. Returns `Ok(false)` on mismatch; errors only on malformed input.
pub(super) async fn verify_password(candidate: String, stored: String) -> Result<bool> {
    let current_span = tracing::Span::current();
    tokio::task::spawn_blocking(move || {
        current_span.in_scope(move || {
            let parsed = PasswordHash::new(&stored)
                .map_err(|err| anyhow!("stored password hash is malformed: {err}"))?;
            match argon2()?.verify_password(candidate.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(err) => Err(anyhow!("failed to verify password: {err}")),
            }
        })
    })
    .await
    .context("password verification task failed")?
}

/// Digest a raw token for storage and conditional comparison.
pub(super) fn token_digest(raw_token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hasher.finalize().to_vec()
}
