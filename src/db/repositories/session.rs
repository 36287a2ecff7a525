//! Session repository
//!
//! Database operations for login sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite
//!
//! Every operation that changes which sessions are active also recomputes the
//! owning user's online flag inside the same transaction, so the flag never
//! disagrees with the session rows.

use crate::db::repositories::user::row_to_user_sqlite;
use crate::db::DynDatabasePool;
use crate::models::{Session, SweepReport, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Open a session for `user_id`, deactivating any session the user already
    /// had, and mark the user online with `last_login = now`.
    async fn start(&self, user_id: i64, token: &str, now: DateTime<Utc>) -> Result<Session>;

    /// Deactivate the active session with this token.
    ///
    /// Returns `false` when the token is unknown or already inactive.
    async fn end(&self, token: &str) -> Result<bool>;

    /// Bump `last_activity` of an active session. Returns `false` if the token
    /// is not active.
    async fn touch(&self, token: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Deactivate every active session idle since before `cutoff`
    async fn sweep(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<SweepReport>;

    /// Get a session by token, active or not
    async fn get_by_token(&self, token: &str) -> Result<Option<Session>>;

    /// Active sessions with activity at or after `since`, joined with their
    /// online owners, most recent activity first
    async fn list_active(&self, since: DateTime<Utc>) -> Result<Vec<(User, Session)>>;

    /// The user's active session, if any
    async fn get_active_for_user(&self, user_id: i64) -> Result<Option<Session>>;

    /// The user's most recent sessions, newest login first
    async fn list_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Session>>;

    /// Count all sessions ever opened by the user
    async fn count_for_user(&self, user_id: i64) -> Result<i64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn start(&self, user_id: i64, token: &str, now: DateTime<Utc>) -> Result<Session> {
        start_session_sqlite(self.pool.as_sqlite(), user_id, token, now).await
    }

    async fn end(&self, token: &str) -> Result<bool> {
        end_session_sqlite(self.pool.as_sqlite(), token).await
    }

    async fn touch(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        touch_session_sqlite(self.pool.as_sqlite(), token, now).await
    }

    async fn sweep(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<SweepReport> {
        sweep_sessions_sqlite(self.pool.as_sqlite(), cutoff, now).await
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Session>> {
        get_session_by_token_sqlite(self.pool.as_sqlite(), token).await
    }

    async fn list_active(&self, since: DateTime<Utc>) -> Result<Vec<(User, Session)>> {
        list_active_sessions_sqlite(self.pool.as_sqlite(), since).await
    }

    async fn get_active_for_user(&self, user_id: i64) -> Result<Option<Session>> {
        get_active_session_for_user_sqlite(self.pool.as_sqlite(), user_id).await
    }

    async fn list_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Session>> {
        list_sessions_for_user_sqlite(self.pool.as_sqlite(), user_id, limit).await
    }

    async fn count_for_user(&self, user_id: i64) -> Result<i64> {
        count_sessions_for_user_sqlite(self.pool.as_sqlite(), user_id).await
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn start_session_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Session> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("UPDATE user_sessions SET is_active = 0 WHERE user_id = ? AND is_active = 1")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to deactivate previous sessions")?;

    let result = sqlx::query(
        r#"
        INSERT INTO user_sessions (user_id, session_token, login_time, last_activity, is_active)
        VALUES (?, ?, ?, ?, 1)
        "#,
    )
    .bind(user_id)
    .bind(token)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create session")?;

    let updated = sqlx::query("UPDATE users SET is_online = 1, last_login = ? WHERE id = ?")
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to mark user online")?;

    if updated.rows_affected() == 0 {
        anyhow::bail!("User {} not found while starting session", user_id);
    }

    tx.commit().await.context("Failed to commit session start")?;

    Ok(Session {
        id: result.last_insert_rowid(),
        user_id,
        token: token.to_string(),
        login_time: now,
        last_activity: now,
        is_active: true,
    })
}

async fn end_session_sqlite(pool: &SqlitePool, token: &str) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query(
        "SELECT user_id FROM user_sessions WHERE session_token = ? AND is_active = 1",
    )
    .bind(token)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to look up session")?;

    let Some(row) = row else {
        return Ok(false);
    };
    let user_id: i64 = row.get("user_id");

    sqlx::query("UPDATE user_sessions SET is_active = 0 WHERE session_token = ?")
        .bind(token)
        .execute(&mut *tx)
        .await
        .context("Failed to deactivate session")?;

    set_offline_if_idle(&mut tx, user_id).await?;

    tx.commit().await.context("Failed to commit session end")?;
    Ok(true)
}

async fn touch_session_sqlite(pool: &SqlitePool, token: &str, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE user_sessions SET last_activity = ? WHERE session_token = ? AND is_active = 1",
    )
    .bind(now)
    .bind(token)
    .execute(pool)
    .await
    .context("Failed to update session activity")?;

    Ok(result.rows_affected() > 0)
}

async fn sweep_sessions_sqlite(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let rows = sqlx::query(
        "SELECT DISTINCT user_id FROM user_sessions WHERE is_active = 1 AND last_activity < ?",
    )
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await
    .context("Failed to find stale sessions")?;
    let affected_users: Vec<i64> = rows.iter().map(|r| r.get("user_id")).collect();

    let deactivated = sqlx::query(
        "UPDATE user_sessions SET is_active = 0 WHERE is_active = 1 AND last_activity < ?",
    )
    .bind(cutoff)
    .execute(&mut *tx)
    .await
    .context("Failed to deactivate stale sessions")?
    .rows_affected();

    let mut users_set_offline = 0;
    for user_id in affected_users {
        if set_offline_if_idle(&mut tx, user_id).await? {
            users_set_offline += 1;
        }
    }

    tx.commit().await.context("Failed to commit sweep")?;

    Ok(SweepReport {
        deactivated_sessions: deactivated,
        users_set_offline,
        swept_at: now,
    })
}

/// Clear the user's online flag when none of their sessions is active.
/// Returns whether the flag changed.
async fn set_offline_if_idle(tx: &mut Transaction<'_, Sqlite>, user_id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users SET is_online = 0
        WHERE id = ? AND is_online = 1
          AND NOT EXISTS (SELECT 1 FROM user_sessions WHERE user_id = ? AND is_active = 1)
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .execute(&mut **tx)
    .await
    .context("Failed to update online flag")?;

    Ok(result.rows_affected() > 0)
}

async fn get_session_by_token_sqlite(pool: &SqlitePool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, session_token, login_time, last_activity, is_active
        FROM user_sessions
        WHERE session_token = ?
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by token")?;

    row.as_ref().map(row_to_session_sqlite).transpose()
}

async fn list_active_sessions_sqlite(
    pool: &SqlitePool,
    since: DateTime<Utc>,
) -> Result<Vec<(User, Session)>> {
    let rows = sqlx::query(
        r#"
        SELECT u.id, u.username, u.password_hash, u.first_name, u.last_name, u.preferred_language,
               u.skills_have, u.skills_want, u.device_fingerprint, u.is_online, u.last_login, u.created_at,
               s.id AS session_id, s.session_token, s.login_time, s.last_activity, s.is_active
        FROM users u
        JOIN user_sessions s ON s.user_id = u.id
        WHERE s.is_active = 1 AND u.is_online = 1 AND s.last_activity >= ?
        ORDER BY s.last_activity DESC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("Failed to list active sessions")?;

    rows.iter()
        .map(|row| {
            let user = row_to_user_sqlite(row)?;
            let session = Session {
                id: row.try_get("session_id")?,
                user_id: user.id,
                token: row.try_get("session_token")?,
                login_time: row.try_get("login_time")?,
                last_activity: row.try_get("last_activity")?,
                is_active: row.try_get("is_active")?,
            };
            Ok((user, session))
        })
        .collect()
}

async fn get_active_session_for_user_sqlite(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, session_token, login_time, last_activity, is_active
        FROM user_sessions
        WHERE user_id = ? AND is_active = 1
        ORDER BY last_activity DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get active session")?;

    row.as_ref().map(row_to_session_sqlite).transpose()
}

async fn list_sessions_for_user_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<Session>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, session_token, login_time, last_activity, is_active
        FROM user_sessions
        WHERE user_id = ?
        ORDER BY login_time DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list sessions for user")?;

    rows.iter().map(row_to_session_sqlite).collect()
}

async fn count_sessions_for_user_sqlite(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM user_sessions WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("Failed to count sessions")?;

    Ok(row.get("count"))
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token: row.try_get("session_token")?,
        login_time: row.try_get("login_time")?,
        last_activity: row.try_get("last_activity")?,
        is_active: row.try_get("is_active")?,
    })
}
