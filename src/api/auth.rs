//! Authentication API endpoints
//!
//! Handles HTTP requests for user authentication:
//! - POST /api/v1/auth/register - User registration
//! - POST /api/v1/auth/login - User login
//! - POST /api/v1/auth/logout - User logout
//! - GET /api/v1/auth/me - Get current user
//! - POST /api/v1/auth/heartbeat - Keep the current session alive

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, SessionToken};
use crate::models::User;
use crate::services::user::{LoginInput, RegisterInput, UserServiceError};

/// Response for a heartbeat
#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub active: bool,
    pub timestamp: DateTime<Utc>,
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/heartbeat", post(heartbeat))
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// POST /api/v1/auth/register - User registration
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.register(body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/v1/auth/login - User login
async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let limiter = &state.rate_limiter;
    let username = body.username.trim().to_lowercase();

    let ip = client_ip(&headers, peer, state.trust_proxy_headers);
    if limiter.is_ip_limited(ip).await {
        tracing::warn!(%ip, "Login rate limit exceeded for IP");
        return Err(ApiError::rate_limited(
            "Too many requests, please try again later",
            limiter.ip_retry_after(ip).await,
        ));
    }
    limiter.record_ip_request(ip).await;

    if limiter.is_username_limited(&username).await {
        tracing::warn!(username = %username, "Login rate limit exceeded for username");
        return Err(ApiError::rate_limited(
            "Too many failed login attempts, please try again later",
            limiter.username_retry_after(&username).await,
        ));
    }

    let outcome = match state.user_service.login(body).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if matches!(e, UserServiceError::AuthenticationError(_)) {
                limiter.record_failed_attempt(&username).await;
            }
            return Err(e.into());
        }
    };

    limiter.clear_username_attempts(&username).await;

    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        outcome.token, state.cookie_max_age_secs
    );
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|_| ApiError::internal_error("Failed to build session cookie"))?,
    );

    Ok((response_headers, Json(outcome)))
}

/// POST /api/v1/auth/logout - User logout
///
/// Requires authentication.
async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<impl IntoResponse, ApiError> {
    state.session_service.end(&token).await?;

    let clear_cookie = "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, HeaderValue::from_static(clear_cookie));

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me - Get current user
///
/// Requires authentication.
async fn get_current_user(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

/// POST /api/v1/auth/heartbeat - Record activity on the current session
async fn heartbeat(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let active = state.session_service.touch(&token).await?;
    Ok(Json(HeartbeatResponse {
        active,
        timestamp: Utc::now(),
    }))
}

/// Address the IP limit is keyed on: the socket peer, or the client reported
/// by a trusted proxy
fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        if let Some(ip) = extract_ip_address(headers) {
            return ip;
        }
    }
    peer.ip()
}

/// Client IP as reported by a fronting proxy
fn extract_ip_address(headers: &HeaderMap) -> Option<IpAddr> {
    // Check X-Forwarded-For header (proxy/load balancer)
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // Take the first IP in the list
            if let Some(ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = ip.trim().parse() {
                    return Some(ip);
                }
            }
        }
    }

    // Check X-Real-IP header
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}
