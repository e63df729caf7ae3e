//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_origin: auth_opts.frontend_origin,
        refresh_cookie_name: auth_opts.refresh_cookie_name,
        verification_token_secret: auth_opts.verification_token_secret,
        reset_password_token_secret: auth_opts.reset_password_token_secret,
        access_token_secret: auth_opts.access_token_secret,
        refresh_token_secret: auth_opts.refresh_token_secret,
        verification_token_minutes: auth_opts.verification_token_minutes,
        reset_password_token_minutes: auth_opts.reset_password_token_minutes,
        access_token_minutes: auth_opts.access_token_minutes,
        refresh_token_minutes: auth_opts.refresh_token_minutes,
    }))
}
