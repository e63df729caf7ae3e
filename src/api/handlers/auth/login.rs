//! Credential login issuing the access/refresh pair.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;

use super::{
    error::AuthError,
    hasher::{token_digest, verify_password},
    session::refresh_cookie,
    state::AuthState,
    store::{FieldUpdate, UserUpdate},
    tokens::{AccessClaims, RefreshClaims, TokenClass},
    types::{LoginRequest, SessionResponse, UserSummary},
    utils::classify_identifier,
};

/// Log in with username or email. The access token rides in the body, the
/// refresh token only in an `HttpOnly` cookie.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established", body = SessionResponse),
        (status = 401, description = "Unknown identifier or wrong password", body = String),
        (status = 403, description = "Account not verified", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    match establish_session(&auth_state, request).await {
        Ok((cookie, session)) => {
            let mut response_headers = HeaderMap::new();
            response_headers.insert(SET_COOKIE, cookie);
            (StatusCode::OK, response_headers, Json(session)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn establish_session(
    auth_state: &AuthState,
    request: LoginRequest,
) -> Result<(axum::http::HeaderValue, SessionResponse), AuthError> {
    let identifier = classify_identifier(&request.identifier)
        .ok_or(AuthError::Validation("A valid username or email is required."))?;

    // Unknown identifier and wrong password collapse into one reply.
    let record = auth_state
        .store()
        .find_for_login(&identifier)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !record.user.is_verified {
        return Err(AuthError::AccountNotVerified);
    }
    if !verify_password(request.password, record.password_hash).await? {
        return Err(AuthError::InvalidCredentials);
    }

    let access_token = auth_state.codec().sign(
        TokenClass::Access,
        &AccessClaims {
            id: record.user.id.to_string(),
            username: record.user.username.clone(),
            email: record.user.email.clone(),
        },
    )?;
    let refresh_token = auth_state.codec().sign(
        TokenClass::Refresh,
        &RefreshClaims {
            id: record.user.id.to_string(),
        },
    )?;

    // One live session per account: the new digest overwrites whatever
    // session existed before.
    let update = UserUpdate {
        refresh_token_hash: FieldUpdate::Set(token_digest(&refresh_token)),
        touch_last_login: true,
        ..UserUpdate::default()
    };
    let found = auth_state.store().update(record.user.id, update).await?;
    if !found {
        return Err(AuthError::InvalidCredentials);
    }

    let cookie = refresh_cookie(auth_state.config(), &refresh_token)
        .map_err(|err| anyhow::anyhow!("failed to build refresh cookie: {err}"))?;
    let session = SessionResponse {
        user: UserSummary::from(&record.user),
        access_token,
    };
    Ok((cookie, session))
}
