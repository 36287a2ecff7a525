//! Data models
//!
//! Database entities (User, Session) and the read models derived from them.

mod session;
mod user;

pub use session::{
    mask_token, ActiveUser, ActivityStatus, ActivitySummary, Session, SessionView, SweepReport,
};
pub use user::{User, UserSummary};
