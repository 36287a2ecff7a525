//! Database repositories
//!
//! Repository pattern implementations for database access.

pub mod session;
pub mod user;

pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Whether a repository error was caused by a UNIQUE constraint rejecting
/// the write
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    })
}
