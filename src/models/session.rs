//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::User;

/// A login session tracked by token.
///
/// Sessions move from active to inactive exactly once; an inactive session
/// is never revived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    /// Opaque bearer token
    pub token: String,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
}

impl Session {
    /// True once the session has been idle for longer than `timeout`
    pub fn is_stale(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity > timeout
    }

    /// Token shortened for listings: the first 8 characters followed by `...`
    pub fn masked_token(&self) -> String {
        mask_token(&self.token)
    }
}

/// Shorten a token so it can be shown without being replayable
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}...", prefix)
}

/// How recently a user did something, bucketed by minutes of idleness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    VeryActive,
    Active,
    Idle,
    Inactive,
}

impl ActivityStatus {
    /// `< 5` very active, `< 15` active, `< 30` idle, otherwise inactive
    pub fn from_idle_minutes(minutes: i64) -> Self {
        match minutes {
            m if m < 5 => Self::VeryActive,
            m if m < 15 => Self::Active,
            m if m < 30 => Self::Idle,
            _ => Self::Inactive,
        }
    }
}

/// A user together with their current active session.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveUser {
    pub user: User,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub minutes_since_activity: i64,
    pub activity_status: ActivityStatus,
    pub session_token: String,
}

/// A session as shown in activity listings, with the token masked.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: i64,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub session_token: String,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            login_time: session.login_time,
            last_activity: session.last_activity,
            is_active: session.is_active,
            session_token: session.masked_token(),
        }
    }
}

/// Outcome of a stale-session sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub deactivated_sessions: u64,
    pub users_set_offline: u64,
    pub swept_at: DateTime<Utc>,
}

/// Session history for one user.
#[derive(Debug, Clone, Serialize)]
pub struct ActivitySummary {
    pub user: User,
    pub is_currently_active: bool,
    pub active_session: Option<SessionView>,
    pub recent_sessions: Vec<SessionView>,
    pub total_sessions: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_idle_for(minutes: i64, now: DateTime<Utc>) -> Session {
        Session {
            id: 1,
            user_id: 1,
            token: "0123456789abcdef".to_string(),
            login_time: now - Duration::minutes(minutes + 1),
            last_activity: now - Duration::minutes(minutes),
            is_active: true,
        }
    }

    #[test]
    fn test_is_stale() {
        let now = Utc::now();
        let timeout = Duration::minutes(30);

        assert!(!session_idle_for(0, now).is_stale(timeout, now));
        assert!(!session_idle_for(30, now).is_stale(timeout, now));
        assert!(session_idle_for(31, now).is_stale(timeout, now));
    }

    #[test]
    fn test_masked_token() {
        let now = Utc::now();
        assert_eq!(session_idle_for(0, now).masked_token(), "01234567...");
        assert_eq!(mask_token("abc"), "abc...");
    }

    #[test]
    fn test_activity_status_buckets() {
        assert_eq!(ActivityStatus::from_idle_minutes(0), ActivityStatus::VeryActive);
        assert_eq!(ActivityStatus::from_idle_minutes(4), ActivityStatus::VeryActive);
        assert_eq!(ActivityStatus::from_idle_minutes(5), ActivityStatus::Active);
        assert_eq!(ActivityStatus::from_idle_minutes(14), ActivityStatus::Active);
        assert_eq!(ActivityStatus::from_idle_minutes(15), ActivityStatus::Idle);
        assert_eq!(ActivityStatus::from_idle_minutes(29), ActivityStatus::Idle);
        assert_eq!(ActivityStatus::from_idle_minutes(30), ActivityStatus::Inactive);
    }

    #[test]
    fn test_activity_status_serializes_snake_case() {
        let json = serde_json::to_string(&ActivityStatus::VeryActive).unwrap();
        assert_eq!(json, "\"very_active\"");
    }

    #[test]
    fn test_session_view_masks_token() {
        let now = Utc::now();
        let view = SessionView::from(&session_idle_for(3, now));
        assert_eq!(view.session_token, "01234567...");
        assert!(view.is_active);
    }
}
