//! API middleware
//!
//! Contains:
//! - The shared application state
//! - The JSON error type returned by every endpoint
//! - Authentication (session token validation)
//! - Security response headers

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, MAX_WINDOW_MINUTES};
use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    LoginRateLimiter, Matcher, SessionService, SessionServiceError, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub session_service: Arc<SessionService>,
    pub matcher: Matcher,
    pub rate_limiter: Arc<LoginRateLimiter>,
    /// Default window for `/users/recent`
    pub recent_minutes: i64,
    /// Max-Age of the session cookie
    pub cookie_max_age_secs: i64,
    /// Key the IP limit on proxy headers rather than the socket peer
    pub trust_proxy_headers: bool,
}

impl AppState {
    /// Wire repositories and services over `pool` using `config`
    pub fn new(pool: DynDatabasePool, config: &Config) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());

        let session_service = Arc::new(SessionService::with_timeout(
            session_repo,
            user_repo.clone(),
            config.session.timeout_minutes,
        ));
        let user_service = Arc::new(UserService::new(user_repo, session_service.clone()));

        Self {
            pool,
            user_service,
            session_service,
            matcher: Matcher::new(config.matching.threshold),
            rate_limiter: Arc::new(LoginRateLimiter::new(&config.rate_limit)),
            recent_minutes: config.session.recent_minutes,
            cookie_max_age_secs: config.session.timeout_minutes.clamp(1, MAX_WINDOW_MINUTES) * 60,
            trust_proxy_headers: config.server.trust_proxy_headers,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Token of the session that authenticated the request
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: i64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::ValidationError(msg) => Self::validation_error(msg),
            UserServiceError::AuthenticationError(msg) => Self::unauthorized(msg),
            UserServiceError::UserExists(msg) => Self::conflict(msg),
            UserServiceError::NotFound => Self::not_found("User not found"),
            UserServiceError::InternalError(e) => {
                tracing::error!(error = ?e, "User service failure");
                Self::internal_error("Internal server error")
            }
        }
    }
}

impl From<SessionServiceError> for ApiError {
    fn from(err: SessionServiceError) -> Self {
        match err {
            SessionServiceError::UserNotFound(_) => Self::not_found("User not found"),
            SessionServiceError::InternalError(e) => {
                tracing::error!(error = ?e, "Session service failure");
                Self::internal_error("Internal server error")
            }
        }
    }
}

/// Extract session token from request headers.
///
/// A bearer token wins over the `session` cookie.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Authentication middleware
///
/// Validates (and thereby touches) the presented session, then exposes the
/// user and token to handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .session_service
        .validate(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    request.extensions_mut().insert(SessionToken(token));
    Ok(next.run(request).await)
}

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    (
        "content-security-policy",
        "default-src 'self'; script-src 'self' 'unsafe-inline'",
    ),
];

/// Add the standard security headers to every response
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let headers = headers_with(header::AUTHORIZATION, "Bearer test-token-123");
        assert_eq!(extract_session_token(&headers), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let headers = headers_with(header::COOKIE, "theme=dark; session=test-token-456");
        assert_eq!(extract_session_token(&headers), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let mut headers = headers_with(header::AUTHORIZATION, "Bearer bearer-token");
        headers.insert(header::COOKIE, HeaderValue::from_static("session=cookie-token"));
        assert_eq!(extract_session_token(&headers), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        let cleared = headers_with(header::COOKIE, "session=");
        assert!(extract_session_token(&cleared).is_none());
    }

    #[test]
    fn test_extract_session_token_invalid_bearer() {
        let headers = headers_with(header::AUTHORIZATION, "Basic invalid");
        assert!(extract_session_token(&headers).is_none());
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited("x", 60).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::internal_error("x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_details() {
        let error = ApiError::rate_limited("Too many attempts", 900);
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["error"]["code"], "RATE_LIMIT");
        assert_eq!(json["error"]["details"]["retry_after"], 900);
    }

    #[test]
    fn test_service_errors_map_to_api_codes() {
        let exists: ApiError = UserServiceError::UserExists("taken".into()).into();
        assert_eq!(exists.error.code, "CONFLICT");

        let internal: ApiError =
            UserServiceError::InternalError(anyhow::anyhow!("db gone")).into();
        assert_eq!(internal.error.code, "INTERNAL_ERROR");
        assert!(!internal.error.message.contains("db gone"));

        let missing: ApiError = SessionServiceError::UserNotFound(7).into();
        assert_eq!(missing.error.code, "NOT_FOUND");
    }
}
