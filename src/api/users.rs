//! User API endpoints
//!
//! - GET /api/v1/users - List users
//! - GET /api/v1/users/active - Users with a live session
//! - GET /api/v1/users/recent - Users active in the last N minutes
//! - GET /api/v1/users/{id} - User profile
//! - GET /api/v1/users/{id}/activity - Session history (auth)
//! - GET /api/v1/users/{id}/matches - Who the user can teach and learn from (auth)

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{ActiveUser, ActivitySummary, User};
use crate::services::UserMatches;

/// Query parameters for the recently-active listing
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub minutes: Option<i64>,
}

/// Response for the user list
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub total: usize,
}

/// Response for active-user listings
#[derive(Debug, Serialize)]
pub struct ActiveUsersResponse {
    pub users: Vec<ActiveUser>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<i64>,
}

/// Build public user routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/active", get(active_users))
        .route("/recent", get(recent_users))
        .route("/{id}", get(get_user))
}

/// Build protected user routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/{id}/activity", get(user_activity))
        .route("/{id}/matches", get(user_matches))
}

/// GET /api/v1/users
async fn list_users(State(state): State<AppState>) -> Result<Json<UserListResponse>, ApiError> {
    let users = state.user_service.list().await?;
    Ok(Json(UserListResponse {
        total: users.len(),
        users,
    }))
}

/// GET /api/v1/users/active
async fn active_users(
    State(state): State<AppState>,
) -> Result<Json<ActiveUsersResponse>, ApiError> {
    let users = state.session_service.active_users().await?;
    Ok(Json(ActiveUsersResponse {
        count: users.len(),
        users,
        minutes: None,
    }))
}

/// GET /api/v1/users/recent?minutes=N
async fn recent_users(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<ActiveUsersResponse>, ApiError> {
    let minutes = query.minutes.unwrap_or(state.recent_minutes);
    if minutes <= 0 {
        return Err(ApiError::validation_error("minutes must be positive"));
    }

    let users = state.session_service.recently_active(minutes).await?;
    Ok(Json(ActiveUsersResponse {
        count: users.len(),
        users,
        minutes: Some(minutes),
    }))
}

/// GET /api/v1/users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    state
        .user_service
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// GET /api/v1/users/{id}/activity
async fn user_activity(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ActivitySummary>, ApiError> {
    let summary = state.session_service.activity_summary(id).await?;
    Ok(Json(summary))
}

/// GET /api/v1/users/{id}/matches
async fn user_matches(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserMatches>, ApiError> {
    let users = state.user_service.list().await?;
    state
        .matcher
        .matches_for_user(&users, id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}
