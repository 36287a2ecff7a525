//! Matching API endpoints
//!
//! - GET /api/v1/matches - Mutual and one-way matches (auth)
//! - GET /api/v1/matches/teaching - Directed teaching pairs (auth)
//! - GET /api/v1/dashboard - Users, presence and match overview
//!
//! Matches are recomputed from the full user table on every request.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{ActiveUser, SweepReport, User};
use crate::services::matching::TeachingPair;
use crate::services::{MatchReport, MatchStats};

/// Response for the teaching listing
#[derive(Debug, Serialize)]
pub struct TeachingResponse {
    pub pairs: Vec<TeachingPair>,
    pub count: usize,
}

/// Response for the dashboard
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub stats: MatchStats,
    pub users: Vec<User>,
    pub active_users: Vec<ActiveUser>,
    pub matches: MatchReport,
    pub sweep: SweepReport,
}

/// Build protected match routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_matches))
        .route("/teaching", get(teaching_pairs))
}

/// GET /api/v1/matches
async fn list_matches(State(state): State<AppState>) -> Result<Json<MatchReport>, ApiError> {
    let users = state.user_service.list().await?;
    Ok(Json(state.matcher.find_matches(&users)))
}

/// GET /api/v1/matches/teaching
async fn teaching_pairs(
    State(state): State<AppState>,
) -> Result<Json<TeachingResponse>, ApiError> {
    let users = state.user_service.list().await?;
    let pairs = state.matcher.teaching_pairs(&users);
    Ok(Json(TeachingResponse {
        count: pairs.len(),
        pairs,
    }))
}

/// GET /api/v1/dashboard
///
/// Sweeps stale sessions first so presence and live matches are current.
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let sweep = state.session_service.sweep().await?;
    let active_users = state.session_service.active_users().await?;
    let users = state.user_service.list().await?;

    let matches = state.matcher.find_matches(&users);
    let stats = MatchStats::compute(&users, &matches);

    Ok(Json(DashboardResponse {
        stats,
        users,
        active_users,
        matches,
        sweep,
    }))
}
