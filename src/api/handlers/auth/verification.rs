//! Email verification endpoints.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;

use crate::api::email::EmailMessage;

use super::{
    error::{AuthError, VERIFIED_CONFLICT},
    hasher::token_digest,
    state::AuthState,
    store::{FieldUpdate, UserIdentifier, UserUpdate},
    tokens::{EmailClaims, TokenClass},
    types::{MessageResponse, ResendVerificationRequest, VerifyEmailRequest},
    utils::{frontend_link, normalize_email, valid_email},
};

const VERIFIED: &str = "User verified successfully.";
const RESENT: &str = "Verification email sent.";

/// Consume the emailed token and flip the account to verified.
#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 401, description = "Missing, invalid, or expired token", body = String),
        (status = 409, description = "Account already verified", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    match consume_verification(&auth_state, &request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn consume_verification(
    auth_state: &AuthState,
    request: &VerifyEmailRequest,
) -> Result<MessageResponse, AuthError> {
    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    let claims: EmailClaims = auth_state
        .codec()
        .verify(TokenClass::Verification, token)?;
    let record = auth_state
        .store()
        .find_for_verification(&claims.username)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    if record.user.is_verified {
        return Err(AuthError::AccountConflict(VERIFIED_CONFLICT));
    }
    // A signed token is not enough: its digest must still match the stored
    // one, so tokens reissued or superseded by resend cannot replay.
    let stored = record
        .verification_token_hash
        .ok_or(AuthError::InvalidToken)?;
    if token_digest(token) != stored {
        return Err(AuthError::InvalidToken);
    }

    let update = UserUpdate {
        is_verified: Some(true),
        verification_token_hash: FieldUpdate::Clear,
        ..UserUpdate::default()
    };
    let found = auth_state.store().update(record.user.id, update).await?;
    if !found {
        return Err(AuthError::InvalidToken);
    }

    Ok(MessageResponse {
        message: VERIFIED.to_string(),
    })
}

/// Reissue the verification email. The response never reveals whether the
/// address exists or is already verified.
#[utoipa::path(
    post,
    path = "/v1/auth/verification/resend",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Resend accepted", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    if let Err(err) = reissue_verification(&auth_state, &request).await {
        // Failures stay server-side; the reply is the same either way.
        error!("Failed to resend verification email: {err}");
    }
    (
        StatusCode::OK,
        Json(MessageResponse {
            message: RESENT.to_string(),
        }),
    )
        .into_response()
}

async fn reissue_verification(
    auth_state: &AuthState,
    request: &ResendVerificationRequest,
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
    if user.is_verified {
        return Ok(());
    }

    let token = auth_state.codec().sign(
        TokenClass::Verification,
        &EmailClaims {
            username: user.username.clone(),
        },
    )?;
    // Persist the new digest first; the previous emailed token dies here
    // whether or not delivery succeeds.
    let update = UserUpdate {
        verification_token_hash: FieldUpdate::Set(token_digest(&token)),
        ..UserUpdate::default()
    };
    auth_state.store().update(user.id, update).await?;

    let link = frontend_link(auth_state.config().frontend_origin(), "verify-email", &token);
    let message = EmailMessage::verification(&user.email, &user.username, &link);
    auth_state
        .email()
        .send(&message)
        .map_err(AuthError::Internal)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::tests::{memory_state, seed_account};
    use anyhow::Result;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn verify_email_missing_payload() {
        let (state, _store) = memory_state();
        let response = verify_email(Extension(state), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn verify_email_empty_token() {
        let (state, _store) = memory_state();
        let response = verify_email(
            Extension(state),
            Some(Json(VerifyEmailRequest {
                token: " ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn verify_email_garbage_token() {
        let (state, _store) = memory_state();
        let response = verify_email(
            Extension(state),
            Some(Json(VerifyEmailRequest {
                token: "not-a-jwt".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn verify_email_flips_once_then_conflicts() -> Result<()> {
        let (state, store) = memory_state();
        let token = seed_account(&state, &store, "alice12", "alice@example.com", false).await?;

        let response = verify_email(
            Extension(state.clone()),
            Some(Json(VerifyEmailRequest {
                token: token.clone(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = verify_email(Extension(state), Some(Json(VerifyEmailRequest { token })))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        Ok(())
    }

    #[tokio::test]
    async fn resend_is_opaque_for_unknown_email() {
        let (state, _store) = memory_state();
        let response = resend_verification(
            Extension(state),
            Some(Json(ResendVerificationRequest {
                email: "ghost@example.com".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn resend_invalidates_previous_token() -> Result<()> {
        let (state, store) = memory_state();
        let old_token = seed_account(&state, &store, "alice12", "alice@example.com", false).await?;

        let response = resend_verification(
            Extension(state.clone()),
            Some(Json(ResendVerificationRequest {
                email: "alice@example.com".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        // The superseded token still carries a valid signature but no longer
        // matches the stored digest.
        let response = verify_email(
            Extension(state),
            Some(Json(VerifyEmailRequest { token: old_token })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
