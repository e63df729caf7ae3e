use anyhow::{Context, Result};
use clap::{Arg, Command};
use secrecy::SecretString;

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_frontend_args(command);
    let command = with_secret_args(command);
    with_ttl_args(command)
}

fn with_frontend_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-origin")
                .long("frontend-origin")
                .help("Frontend origin used for CORS and emailed links")
                .env("TESSERA_FRONTEND_ORIGIN")
                .default_value("http://localhost:5173"),
        )
        .arg(
            Arg::new("refresh-cookie-name")
                .long("refresh-cookie-name")
                .help("Name of the HttpOnly cookie carrying the refresh token")
                .env("TESSERA_REFRESH_COOKIE_NAME")
                .default_value("refresh_token"),
        )
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("verification-token-secret")
                .long("verification-token-secret")
                .help("Signing secret for email verification tokens")
                .env("TESSERA_VERIFICATION_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("reset-password-token-secret")
                .long("reset-password-token-secret")
                .help("Signing secret for password reset tokens")
                .env("TESSERA_RESET_PASSWORD_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("access-token-secret")
                .long("access-token-secret")
                .help("Signing secret for access tokens")
                .env("TESSERA_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("refresh-token-secret")
                .long("refresh-token-secret")
                .help("Signing secret for refresh tokens")
                .env("TESSERA_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
}

fn with_ttl_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("verification-token-minutes")
                .long("verification-token-minutes")
                .help("Email verification token lifetime in minutes")
                .env("TESSERA_VERIFICATION_TOKEN_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("reset-password-token-minutes")
                .long("reset-password-token-minutes")
                .help("Password reset token lifetime in minutes")
                .env("TESSERA_RESET_PASSWORD_TOKEN_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("access-token-minutes")
                .long("access-token-minutes")
                .help("Access token lifetime in minutes")
                .env("TESSERA_ACCESS_TOKEN_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("refresh-token-minutes")
                .long("refresh-token-minutes")
                .help("Refresh token and cookie lifetime in minutes")
                .env("TESSERA_REFRESH_TOKEN_MINUTES")
                .default_value("10080")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub frontend_origin: String,
    pub refresh_cookie_name: String,
    pub verification_token_secret: SecretString,
    pub reset_password_token_secret: SecretString,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub verification_token_minutes: u64,
    pub reset_password_token_minutes: u64,
    pub access_token_minutes: u64,
    pub refresh_token_minutes: u64,
}

impl Options {
    /// Collect the auth arguments out of parsed matches.
    ///
    /// # Errors
    /// Returns an error if a required secret is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            frontend_origin: matches
                .get_one::<String>("frontend-origin")
                .cloned()
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            refresh_cookie_name: matches
                .get_one::<String>("refresh-cookie-name")
                .cloned()
                .unwrap_or_else(|| "refresh_token".to_string()),
            verification_token_secret: secret(matches, "verification-token-secret")?,
            reset_password_token_secret: secret(matches, "reset-password-token-secret")?,
            access_token_secret: secret(matches, "access-token-secret")?,
            refresh_token_secret: secret(matches, "refresh-token-secret")?,
            verification_token_minutes: minutes(matches, "verification-token-minutes", 15),
            reset_password_token_minutes: minutes(matches, "reset-password-token-minutes", 15),
            access_token_minutes: minutes(matches, "access-token-minutes", 15),
            refresh_token_minutes: minutes(matches, "refresh-token-minutes", 10080),
        })
    }
}

fn secret(matches: &clap::ArgMatches, id: &str) -> Result<SecretString> {
    matches
        .get_one::<String>(id)
        .cloned()
        .map(SecretString::from)
        .with_context(|| format!("missing required argument: --{id}"))
}

fn minutes(matches: &clap::ArgMatches, id: &str, default: u64) -> u64 {
    matches.get_one::<u64>(id).copied().unwrap_or(default)
}
