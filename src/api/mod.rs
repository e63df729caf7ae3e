use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::options,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;
use url::Url;

use crate::api::handlers::{auth, health};

pub mod email;
pub(crate) mod handlers;
// Route registration happens in openapi.rs so served routes and the document
// cannot drift apart.
mod openapi;

pub use handlers::auth::{AuthConfig, AuthState, MemoryUserStore, PgUserStore, TokenSecrets};
pub use openapi::openapi;

/// Build the full application: documented routes, preflight `OPTIONS /health`,
/// request-id propagation, tracing, CORS pinned to the frontend origin, and
/// the auth state plus database pool as extensions.
///
/// # Errors
/// Returns an error if the configured frontend origin is not a valid URL.
pub fn app(auth_state: Arc<auth::AuthState>, pool: PgPool) -> Result<Router> {
    // Credentials stay on so the browser sends the refresh cookie cross-origin.
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(cors_origin(
            auth_state.config().frontend_origin(),
        )?))
        .allow_credentials(true);

    // Documented routes come from openapi.rs; `OPTIONS /health` is served but
    // kept out of the document.
    let (router, _openapi) = openapi::api_router().split_for_parts();
    let app = router.route("/health", options(health::health)).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(cors)
            .layer(Extension(auth_state))
            .layer(Extension(pool)),
    );

    Ok(app)
}

/// Connect, bind and serve until Ctrl-C, then drain in-flight requests.
///
/// # Errors
/// Returns an error if the database or the listen address is unavailable.
pub async fn serve(port: u16, dsn: String, auth_config: auth::AuthConfig) -> Result<()> {
    let pool = connect_pool(&dsn).await?;

    let auth_state = Arc::new(auth::AuthState::new(
        auth_config,
        Arc::new(auth::PgUserStore::new(pool.clone())),
        Arc::new(email::LogEmailSender),
    ));

    let app = app(auth_state, pool)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;
    info!("Listening on [::]:{port}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Small pool: the service is stateless and holds a connection only for the
/// duration of a query.
async fn connect_pool(dsn: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(120))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, draining requests"),
        Err(err) => error!("Failed to listen for shutdown signal: {err}"),
    }
}

// One span per request. The route field prefers the matched pattern over the
// raw path so spans aggregate across path parameters.
fn request_span(request: &Request<Body>) -> Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = route,
        request_id
    )
}

/// Reduce the configured frontend URL to its origin (`scheme://host[:port]`)
/// for the CORS allow-origin header.
fn cors_origin(frontend_url: &str) -> Result<HeaderValue> {
    let url = Url::parse(frontend_url)
        .with_context(|| format!("invalid frontend URL: {frontend_url}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("frontend URL has no host: {frontend_url}"))?;

    let origin = match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    };
    HeaderValue::from_str(&origin).context("frontend origin is not a valid header value")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origin_strips_path_and_keeps_port() -> Result<()> {
        assert_eq!(
            cors_origin("http://localhost:5173/app")?,
            HeaderValue::from_static("http://localhost:5173")
        );
        assert_eq!(
            cors_origin("https://tessera.dev")?,
            HeaderValue::from_static("https://tessera.dev")
        );
        Ok(())
    }

    #[test]
    fn cors_origin_rejects_garbage() {
        assert!(cors_origin("not a url").is_err());
        assert!(cors_origin("mailto:team@tessera.dev").is_err());
    }
}
