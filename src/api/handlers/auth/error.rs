//! Error taxonomy shared by every auth flow.
//!
//! The client-visible mapping is deliberately coarse: signature failures,
//! wrong claim shapes, stored-digest mismatches, and missing accounts all
//! surface as the same invalid-token reply, and unknown identifiers are
//! indistinguishable from wrong passwords. Expired and not-yet-valid tokens
//! are the one sanctioned refinement, so clients can prompt for a fresh
//! token instead of a support ticket.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use super::store::StoreError;
use super::tokens::TokenError;

pub(super) const SIGNUP_CONFLICT: &str = "A user with those details already exists.";
pub(super) const VERIFIED_CONFLICT: &str =
    "The user has already been verified. You can log in normally.";

#[derive(Debug, Error)]
pub(super) enum AuthError {
    #[error("validation rejected: {0}")]
    Validation(&'static str),
    #[error("no token was provided")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token not yet valid")]
    TokenNotYetValid,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account not verified")]
    AccountNotVerified,
    #[error("account conflict: {0}")]
    AccountConflict(&'static str),
    #[error("password reuse rejected")]
    PasswordReuse,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub(super) const fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::TokenNotYetValid
            | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AccountNotVerified => StatusCode::FORBIDDEN,
            Self::AccountConflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) | Self::PasswordReuse => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(super) fn public_message(&self) -> &'static str {
        match self {
            Self::Validation(message) => message,
            Self::MissingToken => "No token was provided.",
            Self::InvalidToken => "The token is invalid.",
            Self::TokenExpired => "The token has expired. Please request a new one.",
            Self::TokenNotYetValid => "The token is not active yet.",
            Self::InvalidCredentials => "The provided email or password is incorrect.",
            Self::AccountNotVerified => {
                "The user is not verified. Please verify your email to log in."
            }
            Self::AccountConflict(message) => message,
            Self::PasswordReuse => {
                "The new password must be different from the current password."
            }
            Self::Internal(_) => "Internal server error",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            TokenError::NotYetValid => Self::TokenNotYetValid,
            TokenError::Invalid => Self::InvalidToken,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { field } => {
                // The column stays in the logs; the response is generic.
                error!("duplicate {field} on user create");
                Self::AccountConflict(SIGNUP_CONFLICT)
            }
            StoreError::Backend(err) => Self::Internal(err),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            error!("{err:#}");
        }
        (self.status(), self.public_message().to_string()).into_response()
    }
}
