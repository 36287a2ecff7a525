//! User repository
//!
//! Database operations for user accounts.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite
//!
//! The online flag and last-login time are owned by the session repository,
//! which updates them in the same transaction as the session rows.

use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username (email)
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// List every user in id order
    async fn list(&self) -> Result<Vec<User>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        create_user_sqlite(self.pool.as_sqlite(), user).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        get_user_by_id_sqlite(self.pool.as_sqlite(), id).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        get_user_by_username_sqlite(self.pool.as_sqlite(), username).await
    }

    async fn list(&self) -> Result<Vec<User>> {
        list_users_sqlite(self.pool.as_sqlite()).await
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, first_name, last_name, preferred_language,
                           skills_have, skills_want, device_fingerprint, is_online, last_login, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.preferred_language)
    .bind(&user.skills_have)
    .bind(&user.skills_want)
    .bind(&user.device_fingerprint)
    .bind(user.is_online)
    .bind(user.last_login)
    .bind(user.created_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, username, password_hash, first_name, last_name, preferred_language,
               skills_have, skills_want, device_fingerprint, is_online, last_login, created_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_username_sqlite(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, username, password_hash, first_name, last_name, preferred_language,
               skills_have, skills_want, device_fingerprint, is_online, last_login, created_at
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by username")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn list_users_sqlite(pool: &SqlitePool) -> Result<Vec<User>> {
    let rows = sqlx::query(
        r#"
        SELECT id, username, password_hash, first_name, last_name, preferred_language,
               skills_have, skills_want, device_fingerprint, is_online, last_login, created_at
        FROM users
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

/// Map a row selecting the user columns (by their plain names) to a `User`
pub(crate) fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        preferred_language: row.try_get("preferred_language")?,
        skills_have: row.try_get("skills_have")?,
        skills_want: row.try_get("skills_want")?,
        device_fingerprint: row.try_get("device_fingerprint")?,
        is_online: row.try_get("is_online")?,
        last_login: row.try_get("last_login")?,
        created_at: row.try_get("created_at")?,
    })
}
