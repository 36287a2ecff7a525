//! Session maintenance and health endpoints
//!
//! - POST /api/v1/sessions/sweep - Retire stale sessions now (auth)
//! - GET /api/v1/health - Database ping

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::SweepReport;

/// Response for the health check
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

/// Build protected session routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/sweep", post(sweep))
}

/// POST /api/v1/sessions/sweep
async fn sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, ApiError> {
    let report = state.session_service.sweep().await?;
    Ok(Json(report))
}

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state.pool.ping().await.map_err(|e| {
        tracing::error!(error = ?e, "Health check failed");
        ApiError::internal_error("Database unavailable")
    })?;

    Ok(Json(HealthResponse {
        status: "ok",
        database: "ok",
    }))
}
