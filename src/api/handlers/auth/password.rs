//! Password reset request and apply.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::api::email::EmailMessage;

use super::{
    error::AuthError,
    hasher::{hash_password, token_digest, verify_password},
    session::extract_bearer_token,
    state::AuthState,
    store::{FieldUpdate, UserIdentifier, UserUpdate},
    tokens::{EmailClaims, TokenClass},
    types::{ForgotPasswordRequest, MessageResponse, ResetPasswordRequest},
    utils::{frontend_link, normalize_email, valid_email},
};

const RESET_SENT: &str = "Password reset email sent.";
const RESET_DONE: &str = "Password reset successfully.";

/// Send a password-reset email. Unknown or unverified addresses get the same
/// success reply with no email sent.
#[utoipa::path(
    post,
    path = "/v1/auth/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset accepted", body = MessageResponse),
        (status = 500, description = "Reset email could not be delivered", body = String)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    match issue_reset(&auth_state, &request).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: RESET_SENT.to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn issue_reset(
    auth_state: &AuthState,
    request: &ForgotPasswordRequest,
) -> Result<(), AuthError> {
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Ok(());
    }

    let Some(user) = auth_state
        .store()
        .find_by_identifier(&UserIdentifier::Email(email))
        .await?
    else {
        return Ok(());
    };
    if !user.is_verified {
        return Ok(());
    }

    let token = auth_state.codec().sign(
        TokenClass::ResetPassword,
        &EmailClaims {
            username: user.username.clone(),
        },
    )?;
    let update = UserUpdate {
        reset_password_token_hash: FieldUpdate::Set(token_digest(&token)),
        ..UserUpdate::default()
    };
    auth_state.store().update(user.id, update).await?;

    // Unlike signup, delivery failure is fatal here: the email is the only
    // channel through which the user can obtain the token.
    let link = frontend_link(auth_state.config().frontend_origin(), "reset-password", &token);
    let message = EmailMessage::password_reset(&user.email, &user.username, &link);
    auth_state
        .email()
        .send(&message)
        .map_err(AuthError::Internal)?;
    Ok(())
}

/// Apply a new password using the emailed reset token (sent as a bearer).
#[utoipa::path(
    post,
    path = "/v1/auth/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced", body = MessageResponse),
        (status = 400, description = "Validation failed or password reused", body = String),
        (status = 401, description = "Missing, invalid, or expired token", body = String),
        (status = 403, description = "Account not verified", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    match apply_reset(&headers, &auth_state, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn apply_reset(
    headers: &HeaderMap,
    auth_state: &AuthState,
    request: ResetPasswordRequest,
) -> Result<MessageResponse, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::MissingToken)?;
    request.validate()?;

    let claims: EmailClaims = auth_state
        .codec()
        .verify(TokenClass::ResetPassword, &token)?;
    let record = auth_state
        .store()
        .find_for_reset(&claims.username)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    let stored = record
        .reset_password_token_hash
        .ok_or(AuthError::InvalidToken)?;
    if token_digest(&token) != stored {
        return Err(AuthError::InvalidToken);
    }
    if !record.user.is_verified {
        return Err(AuthError::AccountNotVerified);
    }
    if verify_password(request.password.clone(), record.password_hash).await? {
        return Err(AuthError::PasswordReuse);
    }

    let password_hash = hash_password(request.password).await?;
    // New password and dead reset token land in one update.
    let update = UserUpdate {
        password_hash: Some(password_hash),
        reset_password_token_hash: FieldUpdate::Clear,
        ..UserUpdate::default()
    };
    let found = auth_state.store().update(record.user.id, update).await?;
    if !found {
        return Err(AuthError::InvalidToken);
    }

    Ok(MessageResponse {
        message: RESET_DONE.to_string(),
    })
}
