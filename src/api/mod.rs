//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints of SkillSwap:
//! - Auth endpoints (register, login, logout, heartbeat)
//! - User and presence endpoints
//! - Matching and dashboard endpoints
//! - Session maintenance and health
//! - Optional static file serving

pub mod auth;
pub mod matches;
pub mod middleware;
pub mod sessions;
pub mod users;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

pub use middleware::{ApiError, AppState, AuthenticatedUser, SessionToken};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Protected routes (need a valid session)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/users", users::protected_router())
        .nest("/matches", matches::protected_router())
        .nest("/sessions", sessions::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .nest("/users", users::public_router())
        .route("/dashboard", get(matches::dashboard))
        .route("/health", get(sessions::health))
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);
    match server.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => tracing::warn!(origin = %server.cors_origin, "Ignoring invalid CORS origin"),
    }

    let mut router = Router::new().nest("/api/v1", build_api_router(state.clone()));

    // Static file serving (for production)
    if let Some(dir) = &server.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(cors)
        .layer(axum_middleware::from_fn(middleware::security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
