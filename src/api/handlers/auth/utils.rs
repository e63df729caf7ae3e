//! Small helpers shared across the auth flows.

use once_cell::sync::Lazy;
use regex::Regex;

use super::store::UserIdentifier;

static EMAIL_FORMAT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Lowercased, trimmed form used for lookups and uniqueness.
pub(super) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Shallow shape check on already-normalized input. Deliverability is the
/// verification email's job.
pub(super) fn valid_email(email: &str) -> bool {
    EMAIL_FORMAT
        .as_ref()
        .is_some_and(|format| format.is_match(email))
}

/// Usernames are lowercase alphanumeric, 3 to 8 characters.
pub(super) fn valid_username(username: &str) -> bool {
    (3..=8).contains(&username.len())
        && username
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
}

/// Classify a login identifier as username or email.
///
/// Anything containing `@` must parse as a full email; usernames can never
/// contain `@`, so there is no ambiguous middle ground.
pub(super) fn classify_identifier(identifier: &str) -> Option<UserIdentifier> {
    let trimmed = identifier.trim();
    if trimmed.contains('@') {
        let email = normalize_email(trimmed);
        if valid_email(&email) {
            return Some(UserIdentifier::Email(email));
        }
        return None;
    }
    if valid_username(trimmed) {
        return Some(UserIdentifier::Username(trimmed.to_string()));
    }
    None
}

/// Frontend deep link for outbound emails. The token rides in the fragment,
/// which browsers never send to the server.
pub(super) fn frontend_link(frontend_origin: &str, page: &str, token: &str) -> String {
    format!(
        "{}/{page}#token={token}",
        frontend_origin.trim_end_matches('/')
    )
}

// Postgres SQLSTATE 23505.
pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code.as_ref() == "23505")
}
