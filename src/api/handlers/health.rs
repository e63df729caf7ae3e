use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{Instrument, debug, error, info_span};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

/// Acquire a connection and ping it, each under its own db span.
async fn database_reachable(pool: &PgPool) -> bool {
    let acquire = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let mut conn = match pool.acquire().instrument(acquire).await {
        Ok(conn) => conn,
        Err(err) => {
            error!("Failed to acquire database connection: {err}");
            return false;
        }
    };

    let ping = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
    if let Err(err) = conn.ping().instrument(ping).await {
        error!("Failed to ping database: {err}");
        return false;
    }

    true
}

/// `X-App: name:version:shorthash` so proxy logs can tell deployments apart
/// without reading the body.
fn x_app_header(health: &Health) -> HeaderMap {
    let short_hash = health.commit.get(..7).unwrap_or("");
    let mut headers = HeaderMap::new();
    match format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>() {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => error!("Failed to build X-App header: {err}"),
    }
    headers
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database is healthy", body = [Health]),
        (status = 503, description = "Database is unhealthy", body = [Health])
    ),
    tag = "health"
)]
pub async fn health(method: Method, pool: Extension<PgPool>) -> impl IntoResponse {
    let database_ok = database_reachable(&pool.0).await;
    debug!("database reachable: {database_ok}");

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database_ok { "ok" } else { "error" }.to_string(),
    };

    let headers = x_app_header(&health);

    // HEAD and OPTIONS carry the verdict in status and headers alone.
    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, headers, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use sqlx::postgres::PgPoolOptions;

    fn unreachable_pool() -> Result<PgPool> {
        // Port 1 never carries postgres; acquire fails immediately.
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@127.0.0.1:1/postgres")?)
    }

    #[test]
    fn x_app_header_shortens_commit() {
        let health = Health {
            commit: "0123456789abcdef0123456789abcdef01234567".to_string(),
            name: "tessera".to_string(),
            version: "0.1.0".to_string(),
            database: "ok".to_string(),
        };
        let headers = x_app_header(&health);
        assert_eq!(
            headers.get("X-App").and_then(|value| value.to_str().ok()),
            Some("tessera:0.1.0:0123456")
        );
    }

    #[tokio::test]
    async fn health_reports_unreachable_database() -> Result<()> {
        let response = health(Method::GET, Extension(unreachable_pool()?))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let x_app = response
            .headers()
            .get("X-App")
            .and_then(|value| value.to_str().ok())
            .context("missing X-App header")?;
        assert!(x_app.starts_with(&format!(
            "{}:{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let parsed: Health = serde_json::from_slice(&bytes)?;
        assert_eq!(parsed.database, "error");
        Ok(())
    }

    #[tokio::test]
    async fn health_head_omits_body() -> Result<()> {
        let response = health(Method::HEAD, Extension(unreachable_pool()?))
            .await
            .into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        assert!(bytes.is_empty());
        Ok(())
    }
}
