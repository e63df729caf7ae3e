//! Account creation.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;

use crate::api::email::EmailMessage;

use super::{
    error::AuthError,
    hasher::{hash_password, token_digest},
    state::AuthState,
    store::NewUser,
    tokens::{EmailClaims, TokenClass},
    types::{SignupRequest, SignupResponse},
    utils::{frontend_link, normalize_email},
};

const CREATED: &str =
    "User created successfully. Please access the provided email to verify your user account.";
const CREATED_EMAIL_FAILED: &str = "User created successfully, but there was an issue sending \
     the verification email. Request a new verification email.";

/// Create an unverified account and send the verification email.
#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = SignupResponse),
        (status = 400, description = "Validation failed", body = String),
        (status = 409, description = "Username or email already taken", body = String)
    ),
    tag = "auth"
)]
pub async fn signup(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignupRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    match create_account(&auth_state, request).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn create_account(
    auth_state: &AuthState,
    request: SignupRequest,
) -> Result<SignupResponse, AuthError> {
    request.validate()?;

    let email = normalize_email(&request.email);
    let username = request.username.clone();

    // The digest of the verification token is stored at create time, so the
    // row never exists without a pending verification.
    let verification_token = auth_state.codec().sign(
        TokenClass::Verification,
        &EmailClaims {
            username: username.clone(),
        },
    )?;
    let password_hash = hash_password(request.password).await?;

    let user = auth_state
        .store()
        .create(NewUser {
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            username,
            email,
            password_hash,
            verification_token_hash: token_digest(&verification_token),
        })
        .await?;

    // Email failure downgrades the response instead of rolling back the
    // account; the resend endpoint covers recovery.
    let link = frontend_link(
        auth_state.config().frontend_origin(),
        "verify-email",
        &verification_token,
    );
    let message = EmailMessage::verification(&user.email, &user.username, &link);
    let email_sent = match auth_state.email().send(&message) {
        Ok(()) => true,
        Err(err) => {
            error!("Failed to send verification email: {err}");
            false
        }
    };

    Ok(SignupResponse {
        message: if email_sent {
            CREATED
        } else {
            CREATED_EMAIL_FAILED
        }
        .to_string(),
        email_sent,
    })
}
