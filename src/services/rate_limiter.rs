//! Rate limiter for login attempts
//!
//! Provides protection against brute force attacks by:
//! - Limiting failed login attempts per username
//! - Limiting login requests per IP address
//!
//! The limiter is an ordinary value held in the application state; it has no
//! global instance.

use crate::config::{RateLimitConfig, MAX_WINDOW_MINUTES};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

type AttemptLog<K> = Arc<RwLock<HashMap<K, Vec<DateTime<Utc>>>>>;

/// Login rate limiter
pub struct LoginRateLimiter {
    /// Failed login attempts by username
    username_attempts: AttemptLog<String>,
    /// Request attempts by IP address
    ip_attempts: AttemptLog<IpAddr>,
    max_username_attempts: usize,
    username_window: Duration,
    max_ip_requests: usize,
    ip_window: Duration,
}

impl LoginRateLimiter {
    /// Create a rate limiter with the configured limits
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            username_attempts: Arc::new(RwLock::new(HashMap::new())),
            ip_attempts: Arc::new(RwLock::new(HashMap::new())),
            max_username_attempts: config.login_attempts,
            username_window: Duration::minutes(config.login_window_minutes.clamp(1, MAX_WINDOW_MINUTES)),
            max_ip_requests: config.ip_requests,
            ip_window: Duration::minutes(config.ip_window_minutes.clamp(1, MAX_WINDOW_MINUTES)),
        }
    }

    /// Check if username has used up its failed attempts in the window
    pub async fn is_username_limited(&self, username: &str) -> bool {
        is_limited(
            &self.username_attempts,
            username.to_lowercase(),
            self.username_window,
            self.max_username_attempts,
        )
        .await
    }

    /// Record a failed login attempt for username
    pub async fn record_failed_attempt(&self, username: &str) {
        record(&self.username_attempts, username.to_lowercase()).await;
    }

    /// Clear failed attempts for username (on successful login)
    pub async fn clear_username_attempts(&self, username: &str) {
        let mut attempts = self.username_attempts.write().await;
        attempts.remove(&username.to_lowercase());
    }

    /// Check if IP has used up its requests in the window
    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        is_limited(&self.ip_attempts, ip, self.ip_window, self.max_ip_requests).await
    }

    /// Record a request from IP
    pub async fn record_ip_request(&self, ip: IpAddr) {
        record(&self.ip_attempts, ip).await;
    }

    /// Seconds until a limited username may try again
    pub async fn username_retry_after(&self, username: &str) -> i64 {
        retry_after(&self.username_attempts, &username.to_lowercase(), self.username_window).await
    }

    /// Seconds until a limited IP may try again
    pub async fn ip_retry_after(&self, ip: IpAddr) -> i64 {
        retry_after(&self.ip_attempts, &ip, self.ip_window).await
    }

    /// Clean up old entries (should be called periodically)
    pub async fn cleanup(&self) {
        let now = Utc::now();
        prune(&self.username_attempts, now - self.username_window).await;
        prune(&self.ip_attempts, now - self.ip_window).await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}

async fn is_limited<K: Eq + Hash>(log: &AttemptLog<K>, key: K, window: Duration, max: usize) -> bool {
    let mut attempts = log.write().await;
    let cutoff = Utc::now() - window;

    let entries = attempts.entry(key).or_default();
    entries.retain(|time| *time > cutoff);

    entries.len() >= max
}

async fn record<K: Eq + Hash>(log: &AttemptLog<K>, key: K) {
    let mut attempts = log.write().await;
    attempts.entry(key).or_default().push(Utc::now());
}

async fn retry_after<K: Eq + Hash>(log: &AttemptLog<K>, key: &K, window: Duration) -> i64 {
    let attempts = log.read().await;
    let now = Utc::now();
    attempts
        .get(key)
        .and_then(|times| times.iter().min())
        .map(|oldest| (*oldest + window - now).num_seconds().max(1))
        .unwrap_or(window.num_seconds())
}

async fn prune<K: Eq + Hash>(log: &AttemptLog<K>, cutoff: DateTime<Utc>) {
    let mut attempts = log.write().await;
    attempts.retain(|_, times| {
        times.retain(|time| *time > cutoff);
        !times.is_empty()
    });
}
