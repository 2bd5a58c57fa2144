//! Liveness and readiness probes.

use axum::{extract::State, http::StatusCode};
use tracing::warn;

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies database connectivity within the store timeout. Returns 503
/// Service Unavailable if the database is not reachable. Always ready when
/// running without a database.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    let Some(pool) = state.pool() else {
        return StatusCode::OK;
    };

    let probe = sqlx::query("SELECT 1").fetch_one(pool);
    match tokio::time::timeout(state.store_timeout(), probe).await {
        Ok(Ok(_)) => StatusCode::OK,
        Ok(Err(e)) => {
            warn!(error = %e, "readiness probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(_) => {
            warn!("readiness probe timed out");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
