//! Services layer - Business logic
//!
//! This module contains the business logic of SkillSwap:
//! - Input validation and password hashing
//! - Registration and login
//! - The session lifecycle and presence tracking
//! - Skill matching
//! - Login rate limiting

pub mod matching;
pub mod password;
pub mod rate_limiter;
pub mod session;
pub mod user;
pub mod validation;

pub use matching::{MatchReport, MatchStats, Matcher, UserMatches};
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use session::{SessionService, SessionServiceError};
pub use user::{LoginInput, LoginOutcome, RegisterInput, UserService, UserServiceError};
pub use validation::ValidationError;
