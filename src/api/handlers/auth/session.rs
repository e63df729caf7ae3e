//! Refresh-token rotation and logout.
//!
//! The refresh token travels only in an `HttpOnly` cookie, never a header, so
//! script in the page cannot read it. Rotation is a single conditional update
//! keyed on the digest of the presented token: when two requests race with the
//! same cookie, the store lets exactly one of them swap in the new digest and
//! the other gets the invalid-token reply.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::{
    error::AuthError,
    hasher::token_digest,
    state::{AuthConfig, AuthState},
    store::{FieldUpdate, UserUpdate},
    tokens::{AccessClaims, RefreshClaims, TokenClass},
    types::{SessionResponse, UserSummary},
};

#[utoipa::path(
    post,
    path = "/v1/auth/token/refresh",
    responses(
        (status = 200, description = "Session rotated", body = SessionResponse),
        (status = 401, description = "Missing, invalid, expired, or replayed refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match rotate_session(&headers, &auth_state).await {
        Ok((cookie, session)) => {
            let mut response_headers = HeaderMap::new();
            response_headers.insert(SET_COOKIE, cookie);
            (StatusCode::OK, response_headers, Json(session)).into_response()
        }
        Err(err) => {
            // A token that failed validation is dead weight in the browser;
            // clear it so the client falls back to a clean login.
            let stale_cookie = matches!(
                err,
                AuthError::InvalidToken | AuthError::TokenExpired | AuthError::TokenNotYetValid
            );
            let mut response = err.into_response();
            if stale_cookie {
                if let Ok(cookie) = clear_refresh_cookie(auth_state.config()) {
                    response.headers_mut().insert(SET_COOKIE, cookie);
                }
            }
            response
        }
    }
}

async fn rotate_session(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<(HeaderValue, SessionResponse), AuthError> {
    let config = auth_state.config();
    let presented = extract_cookie_token(headers, config.refresh_cookie_name())
        .ok_or(AuthError::MissingToken)?;

    let claims: RefreshClaims = auth_state
        .codec()
        .verify(TokenClass::Refresh, &presented)?;
    let user_id = Uuid::parse_str(&claims.id).map_err(|_| AuthError::InvalidToken)?;

    let record = auth_state
        .store()
        .find_for_refresh(user_id)
        .await?
        .ok_or(AuthError::InvalidToken)?;
    if record.refresh_token_hash.is_none() {
        // Logged out since this token was minted.
        return Err(AuthError::InvalidToken);
    }

    let next_refresh = auth_state.codec().sign(
        TokenClass::Refresh,
        &RefreshClaims {
            id: record.user.id.to_string(),
        },
    )?;
    let update = UserUpdate {
        refresh_token_hash: FieldUpdate::Set(token_digest(&next_refresh)),
        ..UserUpdate::default()
    };
    let rotated = auth_state
        .store()
        .update_if_refresh_hash(user_id, &token_digest(&presented), update)
        .await?;
    if !rotated {
        // Replay of an already-rotated token, or the loser of a race.
        return Err(AuthError::InvalidToken);
    }

    let access_token = auth_state.codec().sign(
        TokenClass::Access,
        &AccessClaims {
            id: record.user.id.to_string(),
            username: record.user.username.clone(),
            email: record.user.email.clone(),
        },
    )?;
    let cookie = refresh_cookie(config, &next_refresh)
        .map_err(|err| anyhow::anyhow!("failed to build refresh cookie: {err}"))?;
    let session = SessionResponse {
        user: UserSummary::from(&record.user),
        access_token,
    };
    Ok((cookie, session))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let config = auth_state.config();
    if let Some(token) = extract_cookie_token(&headers, config.refresh_cookie_name()) {
        let verified: Result<RefreshClaims, _> =
            auth_state.codec().verify(TokenClass::Refresh, &token);
        if let Ok(claims) = verified {
            if let Ok(user_id) = Uuid::parse_str(&claims.id) {
                let update = UserUpdate {
                    refresh_token_hash: FieldUpdate::Clear,
                    ..UserUpdate::default()
                };
                if let Err(err) = auth_state.store().update(user_id, update).await {
                    error!("Failed to clear session on logout: {err}");
                }
            }
        }
    }

    // Always clear the cookie, even when the token was missing or stale.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie carrying the refresh token.
pub(super) fn refresh_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.refresh_cookie_name();
    let ttl_seconds = config.token_minutes(TokenClass::Refresh).saturating_mul(60);
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = config.refresh_cookie_secure();
    let mut cookie =
        format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.refresh_cookie_name();
    let secure = config.refresh_cookie_secure();
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn extract_cookie_token(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
