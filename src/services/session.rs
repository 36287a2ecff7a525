//! Session service
//!
//! Owns the login-session lifecycle: tokens are issued on login, refreshed
//! by activity, and retired by logout, by the stale-session sweep, or when a
//! stale token is presented. A user holds at most one active session.

use crate::config::MAX_WINDOW_MINUTES;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{ActiveUser, ActivityStatus, ActivitySummary, Session, SessionView, SweepReport, User};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default idle timeout in minutes
pub const DEFAULT_TIMEOUT_MINUTES: i64 = 30;

/// Number of past sessions included in an activity summary
const RECENT_SESSIONS_LIMIT: i64 = 10;

/// Error types for session service operations
#[derive(Debug, thiserror::Error)]
pub enum SessionServiceError {
    /// The referenced user does not exist
    #[error("User not found: {0}")]
    UserNotFound(i64),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Session service for tracking who is logged in
pub struct SessionService {
    session_repo: Arc<dyn SessionRepository>,
    user_repo: Arc<dyn UserRepository>,
    timeout: Duration,
}

impl SessionService {
    /// Create a session service with the default 30 minute timeout
    pub fn new(
        session_repo: Arc<dyn SessionRepository>,
        user_repo: Arc<dyn UserRepository>,
    ) -> Self {
        Self::with_timeout(session_repo, user_repo, DEFAULT_TIMEOUT_MINUTES)
    }

    /// Create a session service with a custom idle timeout, clamped to
    /// `1..=MAX_WINDOW_MINUTES`
    pub fn with_timeout(
        session_repo: Arc<dyn SessionRepository>,
        user_repo: Arc<dyn UserRepository>,
        timeout_minutes: i64,
    ) -> Self {
        Self {
            session_repo,
            user_repo,
            timeout: Duration::minutes(timeout_minutes.clamp(1, MAX_WINDOW_MINUTES)),
        }
    }

    /// Open a new session for the user and mark them online.
    ///
    /// Any session the user already had is deactivated in the same step.
    pub async fn create(&self, user_id: i64) -> Result<Session, SessionServiceError> {
        if self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .is_none()
        {
            return Err(SessionServiceError::UserNotFound(user_id));
        }

        let token = Uuid::new_v4().to_string();
        let session = self
            .session_repo
            .start(user_id, &token, Utc::now())
            .await
            .context("Failed to start session")?;

        tracing::info!(user_id, session_id = session.id, "Session started");
        Ok(session)
    }

    /// End the session with this token.
    ///
    /// Returns `false` for unknown or already inactive tokens.
    pub async fn end(&self, token: &str) -> Result<bool, SessionServiceError> {
        let ended = self
            .session_repo
            .end(token)
            .await
            .context("Failed to end session")?;

        if ended {
            tracing::info!(token = %crate::models::mask_token(token), "Session ended");
        }
        Ok(ended)
    }

    /// Record activity on an active session
    pub async fn touch(&self, token: &str) -> Result<bool, SessionServiceError> {
        let touched = self
            .session_repo
            .touch(token, Utc::now())
            .await
            .context("Failed to touch session")?;
        Ok(touched)
    }

    /// Deactivate every session idle for longer than the timeout
    pub async fn sweep(&self) -> Result<SweepReport, SessionServiceError> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, SessionServiceError> {
        let report = self
            .session_repo
            .sweep(now - self.timeout, now)
            .await
            .context("Failed to sweep sessions")?;

        if report.deactivated_sessions > 0 {
            tracing::info!(
                deactivated = report.deactivated_sessions,
                users_offline = report.users_set_offline,
                "Swept stale sessions"
            );
        } else {
            tracing::debug!("Session sweep found nothing stale");
        }
        Ok(report)
    }

    /// Resolve a token to its user.
    ///
    /// A fresh, active session is touched and its owner returned. A stale
    /// session is ended on the spot and rejected.
    pub async fn validate(&self, token: &str) -> Result<Option<User>, SessionServiceError> {
        let session = match self
            .session_repo
            .get_by_token(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) if s.is_active => s,
            _ => return Ok(None),
        };

        let now = Utc::now();
        if session.is_stale(self.timeout, now) {
            self.end(token).await?;
            tracing::debug!(user_id = session.user_id, "Rejected stale session");
            return Ok(None);
        }

        self.session_repo
            .touch(token, now)
            .await
            .context("Failed to touch session")?;

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    /// Online users with a fresh session, most recent activity first.
    ///
    /// Runs a sweep first so the listing never shows stale sessions.
    pub async fn active_users(&self) -> Result<Vec<ActiveUser>, SessionServiceError> {
        let now = Utc::now();
        self.sweep_at(now).await?;
        self.list_active_since(now - self.timeout, now).await
    }

    /// Like [`active_users`](Self::active_users), limited to activity within
    /// the last `minutes`. Windows longer than the idle timeout are cut to it.
    pub async fn recently_active(&self, minutes: i64) -> Result<Vec<ActiveUser>, SessionServiceError> {
        let now = Utc::now();
        let window = Duration::minutes(minutes.clamp(0, self.timeout.num_minutes()));
        self.list_active_since(now - window, now).await
    }

    async fn list_active_since(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ActiveUser>, SessionServiceError> {
        let rows = self
            .session_repo
            .list_active(since)
            .await
            .context("Failed to list active sessions")?;

        Ok(rows
            .into_iter()
            .map(|(user, session)| {
                let minutes = (now - session.last_activity).num_minutes().max(0);
                ActiveUser {
                    user,
                    login_time: session.login_time,
                    last_activity: session.last_activity,
                    minutes_since_activity: minutes,
                    activity_status: ActivityStatus::from_idle_minutes(minutes),
                    session_token: session.masked_token(),
                }
            })
            .collect())
    }

    /// Session history for one user
    pub async fn activity_summary(&self, user_id: i64) -> Result<ActivitySummary, SessionServiceError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(SessionServiceError::UserNotFound(user_id))?;

        let now = Utc::now();
        let active_session = self
            .session_repo
            .get_active_for_user(user_id)
            .await
            .context("Failed to get active session")?
            .filter(|s| !s.is_stale(self.timeout, now));

        let recent_sessions = self
            .session_repo
            .list_for_user(user_id, RECENT_SESSIONS_LIMIT)
            .await
            .context("Failed to list sessions")?;

        let total_sessions = self
            .session_repo
            .count_for_user(user_id)
            .await
            .context("Failed to count sessions")?;

        Ok(ActivitySummary {
            user,
            is_currently_active: active_session.is_some(),
            active_session: active_session.as_ref().map(SessionView::from),
            recent_sessions: recent_sessions.iter().map(SessionView::from).collect(),
            total_sessions,
        })
    }
}
