//! Database layer
//!
//! SQLite storage behind the `DatabasePool` trait, code-embedded migrations
//! and the repositories for users and sessions.
//!
//! # Usage
//!
//! ```ignore
//! use skillswap::config::DatabaseConfig;
//! use skillswap::db::{create_pool, DatabasePool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool, SqliteDatabase};
