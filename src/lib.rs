//! # Tessera (Authentication & Session Lifecycle)
//!
//! `tessera` owns the account lifecycle around token-based authentication:
//! signup, email verification, login, refresh-token rotation, logout, and
//! password reset.
//!
//! ## Token model
//!
//! Four disjoint token classes drive every flow, each signed with its own
//! secret, audience, and issuer, each with its own lifetime:
//!
//! - **verification**: carries `username`; proves control of the signup email.
//! - **resetPassword**: carries `username`; proves control of the email for a reset.
//! - **access**: carries `id`, `username`, `email`; short-lived API credential.
//! - **refresh**: carries `id`; long-lived, delivered only as an `HttpOnly` cookie.
//!
//! Raw tokens never touch the database. Where replay protection is required
//! (verification, reset, refresh) the `users` row stores a SHA-256 digest of
//! the raw token, and presenting a token means matching that digest. Digests
//! are deterministic so state transitions can be single conditional `UPDATE`
//! statements; under concurrent refresh rotation exactly one request wins.
//!
//! ## Accounts
//!
//! - **Enumeration safety:** login failures, unknown emails on
//!   forgot-password, and resend-verification for missing or already-verified
//!   accounts are indistinguishable from their success counterparts.
//! - **Verify once:** `is_verified` flips `false -> true` exactly once; later
//!   attempts conflict even with a freshly minted token.
//! - **Single session:** one stored refresh digest per account; every login or
//!   refresh overwrites it, logout clears it.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result, ensure};
    use std::fs;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }

    // Normalize SQL to avoid brittle formatting checks in schema tests.
    fn canonicalize_sql(sql: &str) -> String {
        sql.chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| ch.to_ascii_lowercase())
            .collect()
    }

    fn canonical_sql(path: &Path) -> Result<String> {
        let sql = fs::read_to_string(path)
            .with_context(|| format!("Failed to read SQL file at {}", path.display()))?;
        Ok(canonicalize_sql(&sql))
    }

    fn assert_contains(path: &Path, canonical: &str, needle: &str) -> Result<()> {
        ensure!(
            canonical.contains(needle),
            "Expected {needle} is missing in {}",
            path.display()
        );
        Ok(())
    }

    #[test]
    fn users_sql_integrity() -> Result<()> {
        // The store's conditional updates and conflict mapping assume these shapes.
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("db/sql/0001_users.sql");
        let canonical = canonical_sql(&path)?;
        assert_contains(&path, &canonical, "is_verifiedbooleannotnulldefaultfalse")?;
        assert_contains(&path, &canonical, "verification_token_hashbytea")?;
        assert_contains(&path, &canonical, "reset_password_token_hashbytea")?;
        assert_contains(&path, &canonical, "refresh_token_hashbytea")?;
        assert_contains(&path, &canonical, "users_username_keyonusers(username)")?;
        assert_contains(&path, &canonical, "users_email_keyonusers(email)")
    }
}
