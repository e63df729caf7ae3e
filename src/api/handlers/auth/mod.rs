//! Auth handlers and supporting modules.
//!
//! Four token classes drive the account lifecycle: `verification` and
//! `resetPassword` tokens travel by email, `access` tokens ride in response
//! bodies, and `refresh` tokens live only in an `HttpOnly` cookie. Each class
//! signs with its own secret, audience, and issuer, so a token can never be
//! replayed against another class's endpoint.
//!
//! ## Stored digests
//!
//! Verification, reset, and refresh tokens are bound to the account row by a
//! digest of the raw token. Presenting a token whose signature verifies is
//! not enough; its digest must still match the stored one. Clearing or
//! overwriting the digest therefore invalidates every previously issued
//! token of that class, which is what makes resend, rotation, and logout
//! safe.
//!
//! ## Single session
//!
//! An account holds at most one live refresh digest. Login and refresh
//! overwrite it, logout clears it; there is no session table.

mod error;
mod hasher;
pub(crate) mod login;
pub mod memory;
pub(crate) mod password;
pub(crate) mod postgres;
pub(crate) mod session;
pub(crate) mod signup;
mod state;
pub mod store;
mod tokens;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;
pub use state::{AuthConfig, AuthState, TokenSecrets};
