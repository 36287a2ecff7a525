//! Configuration management
//!
//! This module handles loading and parsing configuration for the SkillSwap backend.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session tracking configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Matching configuration
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Login rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Directory served for non-API paths, if any
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP` instead
    /// of the socket peer. Only enable behind a proxy that sets them.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            static_dir: None,
            trust_proxy_headers: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path or `sqlite:` URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/app.db".to_string()
}

/// Session tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which an active session is considered stale
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,
    /// Period of the background sweep; 0 disables it
    #[serde(default)]
    pub sweep_interval_seconds: u64,
    /// Window used by the "recently active" listing
    #[serde(default = "default_recent_minutes")]
    pub recent_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            sweep_interval_seconds: 0,
            recent_minutes: default_recent_minutes(),
        }
    }
}

fn default_timeout_minutes() -> i64 {
    30
}

fn default_recent_minutes() -> i64 {
    5
}

/// Matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum partial ratio (0-100) for two skills to be considered a match
    #[serde(default = "default_threshold")]
    pub threshold: u8,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> u8 {
    80
}

/// Login rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Failed logins allowed per username within the window
    #[serde(default = "default_login_attempts")]
    pub login_attempts: usize,
    #[serde(default = "default_login_window_minutes")]
    pub login_window_minutes: i64,
    /// Login requests allowed per IP within the window
    #[serde(default = "default_ip_requests")]
    pub ip_requests: usize,
    #[serde(default = "default_ip_window_minutes")]
    pub ip_window_minutes: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_attempts: default_login_attempts(),
            login_window_minutes: default_login_window_minutes(),
            ip_requests: default_ip_requests(),
            ip_window_minutes: default_ip_window_minutes(),
        }
    }
}

fn default_login_attempts() -> usize {
    5
}

fn default_login_window_minutes() -> i64 {
    30
}

fn default_ip_requests() -> usize {
    100
}

fn default_ip_window_minutes() -> i64 {
    15
}

/// Upper bound for every minutes-valued setting (one year)
pub const MAX_WINDOW_MINUTES: i64 = 525_600;

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        // Handle empty file - return defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - SKILLSWAP_SERVER_HOST
    /// - SKILLSWAP_SERVER_PORT
    /// - SKILLSWAP_SERVER_CORS_ORIGIN
    /// - SKILLSWAP_SERVER_STATIC_DIR
    /// - SKILLSWAP_SERVER_TRUST_PROXY_HEADERS
    /// - SKILLSWAP_DATABASE_URL
    /// - SKILLSWAP_SESSION_TIMEOUT_MINUTES
    /// - SKILLSWAP_SESSION_SWEEP_INTERVAL_SECONDS
    /// - SKILLSWAP_SESSION_RECENT_MINUTES
    /// - SKILLSWAP_MATCHING_THRESHOLD
    /// - SKILLSWAP_RATE_LIMIT_LOGIN_ATTEMPTS
    /// - SKILLSWAP_RATE_LIMIT_LOGIN_WINDOW_MINUTES
    /// - SKILLSWAP_RATE_LIMIT_IP_REQUESTS
    /// - SKILLSWAP_RATE_LIMIT_IP_WINDOW_MINUTES
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the session, rate limiting or matching
    /// logic meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_minutes("session.timeout_minutes", self.session.timeout_minutes)?;
        check_minutes("session.recent_minutes", self.session.recent_minutes)?;
        check_minutes("rate_limit.login_window_minutes", self.rate_limit.login_window_minutes)?;
        check_minutes("rate_limit.ip_window_minutes", self.rate_limit.ip_window_minutes)?;
        if self.rate_limit.login_attempts == 0 || self.rate_limit.ip_requests == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.login_attempts and rate_limit.ip_requests must be positive".to_string(),
            ));
        }
        if self.matching.threshold > 100 {
            return Err(ConfigError::ValidationError(format!(
                "matching.threshold must be between 0 and 100, got {}",
                self.matching.threshold
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SKILLSWAP_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SKILLSWAP_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("SKILLSWAP_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(dir) = std::env::var("SKILLSWAP_SERVER_STATIC_DIR") {
            self.server.static_dir = if dir.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Some(trust) = env_parse::<bool>("SKILLSWAP_SERVER_TRUST_PROXY_HEADERS") {
            self.server.trust_proxy_headers = trust;
        }

        if let Ok(url) = std::env::var("SKILLSWAP_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(timeout) = std::env::var("SKILLSWAP_SESSION_TIMEOUT_MINUTES") {
            if let Ok(timeout) = timeout.parse::<i64>() {
                self.session.timeout_minutes = timeout;
            }
        }
        if let Ok(interval) = std::env::var("SKILLSWAP_SESSION_SWEEP_INTERVAL_SECONDS") {
            if let Ok(interval) = interval.parse::<u64>() {
                self.session.sweep_interval_seconds = interval;
            }
        }
        if let Some(recent) = env_parse("SKILLSWAP_SESSION_RECENT_MINUTES") {
            self.session.recent_minutes = recent;
        }

        if let Ok(threshold) = std::env::var("SKILLSWAP_MATCHING_THRESHOLD") {
            // Out-of-range values are ignored like any other unparsable override
            if let Ok(threshold) = threshold.parse::<u8>() {
                if threshold <= 100 {
                    self.matching.threshold = threshold;
                }
            }
        }

        if let Some(attempts) = env_parse("SKILLSWAP_RATE_LIMIT_LOGIN_ATTEMPTS") {
            self.rate_limit.login_attempts = attempts;
        }
        if let Some(window) = env_parse("SKILLSWAP_RATE_LIMIT_LOGIN_WINDOW_MINUTES") {
            self.rate_limit.login_window_minutes = window;
        }
        if let Some(requests) = env_parse("SKILLSWAP_RATE_LIMIT_IP_REQUESTS") {
            self.rate_limit.ip_requests = requests;
        }
        if let Some(window) = env_parse("SKILLSWAP_RATE_LIMIT_IP_WINDOW_MINUTES") {
            self.rate_limit.ip_window_minutes = window;
        }
    }
}

fn check_minutes(name: &str, value: i64) -> Result<(), ConfigError> {
    if (1..=MAX_WINDOW_MINUTES).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_WINDOW_MINUTES, value
        )))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "SKILLSWAP_SERVER_HOST",
    "SKILLSWAP_SERVER_PORT",
    "SKILLSWAP_SERVER_CORS_ORIGIN",
    "SKILLSWAP_SERVER_STATIC_DIR",
    "SKILLSWAP_SERVER_TRUST_PROXY_HEADERS",
    "SKILLSWAP_DATABASE_URL",
    "SKILLSWAP_SESSION_TIMEOUT_MINUTES",
    "SKILLSWAP_SESSION_SWEEP_INTERVAL_SECONDS",
    "SKILLSWAP_SESSION_RECENT_MINUTES",
    "SKILLSWAP_MATCHING_THRESHOLD",
    "SKILLSWAP_RATE_LIMIT_LOGIN_ATTEMPTS",
    "SKILLSWAP_RATE_LIMIT_LOGIN_WINDOW_MINUTES",
    "SKILLSWAP_RATE_LIMIT_IP_REQUESTS",
    "SKILLSWAP_RATE_LIMIT_IP_WINDOW_MINUTES",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5001);
        assert!(config.server.static_dir.is_none());
        assert!(!config.server.trust_proxy_headers);
        assert_eq!(config.database.url, "data/app.db");
        assert_eq!(config.session.timeout_minutes, 30);
        assert_eq!(config.session.sweep_interval_seconds, 0);
        assert_eq!(config.session.recent_minutes, 5);
        assert_eq!(config.matching.threshold, 80);
        assert_eq!(config.rate_limit.login_attempts, 5);
        assert_eq!(config.rate_limit.login_window_minutes, 30);
        assert_eq!(config.rate_limit.ip_requests, 100);
        assert_eq!(config.rate_limit.ip_window_minutes, 15);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 5001);
        assert_eq!(config.matching.threshold, 80);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "session:\n  timeout_minutes: 10\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.session.timeout_minutes, 10);
        assert_eq!(config.session.recent_minutes, 5);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.matching.threshold, 80);
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"
server:
  host: "127.0.0.1"
  port: 9000
  cors_origin: "https://skills.example.com"
  static_dir: "public"
database:
  url: "sqlite:/var/lib/skillswap/app.db"
session:
  timeout_minutes: 45
  sweep_interval_seconds: 60
  recent_minutes: 10
matching:
  threshold: 70
rate_limit:
  login_attempts: 3
  login_window_minutes: 10
  ip_requests: 50
  ip_window_minutes: 5
"#).unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.cors_origin, "https://skills.example.com");
        assert_eq!(config.server.static_dir, Some(PathBuf::from("public")));
        assert_eq!(config.database.url, "sqlite:/var/lib/skillswap/app.db");
        assert_eq!(config.session.timeout_minutes, 45);
        assert_eq!(config.session.sweep_interval_seconds, 60);
        assert_eq!(config.session.recent_minutes, 10);
        assert_eq!(config.matching.threshold, 70);
        assert_eq!(config.rate_limit.login_attempts, 3);
        assert_eq!(config.rate_limit.ip_requests, 50);
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let result = Config::load(file.path());

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("parse"));
    }

    #[test]
    fn test_load_malformed_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  host: [invalid yaml").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_threshold_above_100_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "matching:\n  threshold: 150\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn test_non_positive_timeout_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "session:\n  timeout_minutes: 0\n").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_rate_limit_windows_are_bounded() {
        for yaml in [
            "rate_limit:\n  login_window_minutes: -5\n",
            "rate_limit:\n  ip_window_minutes: 0\n",
            "rate_limit:\n  ip_requests: 0\n",
            "rate_limit:\n  login_window_minutes: 9223372036854775807\n",
            "session:\n  timeout_minutes: 9223372036854775807\n",
        ] {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", yaml).unwrap();

            let err = Config::load(file.path()).unwrap_err();
            assert!(err.to_string().contains("must be"), "{}", yaml);
        }

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "session:\n  timeout_minutes: {}\n", MAX_WINDOW_MINUTES).unwrap();
        assert!(Config::load(file.path()).is_ok());
    }

    #[test]
    fn test_env_override_rate_limit() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        std::env::set_var("SKILLSWAP_RATE_LIMIT_LOGIN_ATTEMPTS", "3");
        std::env::set_var("SKILLSWAP_RATE_LIMIT_LOGIN_WINDOW_MINUTES", "10");
        std::env::set_var("SKILLSWAP_RATE_LIMIT_IP_REQUESTS", "20");
        std::env::set_var("SKILLSWAP_RATE_LIMIT_IP_WINDOW_MINUTES", "1");
        std::env::set_var("SKILLSWAP_SESSION_RECENT_MINUTES", "7");
        std::env::set_var("SKILLSWAP_SERVER_TRUST_PROXY_HEADERS", "true");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.rate_limit.login_attempts, 3);
        assert_eq!(config.rate_limit.login_window_minutes, 10);
        assert_eq!(config.rate_limit.ip_requests, 20);
        assert_eq!(config.rate_limit.ip_window_minutes, 1);
        assert_eq!(config.session.recent_minutes, 7);
        assert!(config.server.trust_proxy_headers);

        std::env::set_var("SKILLSWAP_RATE_LIMIT_LOGIN_WINDOW_MINUTES", "-1");
        assert!(Config::load_with_env(file.path()).is_err());

        clear_env();
    }

    #[test]
    fn test_env_override_server_config() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  host: \"0.0.0.0\"\n  port: 8080\n").unwrap();

        std::env::set_var("SKILLSWAP_SERVER_HOST", "192.168.1.1");
        std::env::set_var("SKILLSWAP_SERVER_PORT", "4000");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 4000);

        clear_env();
    }

    #[test]
    fn test_env_override_session_and_matching() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        std::env::set_var("SKILLSWAP_DATABASE_URL", "custom/path.db");
        std::env::set_var("SKILLSWAP_SESSION_TIMEOUT_MINUTES", "15");
        std::env::set_var("SKILLSWAP_SESSION_SWEEP_INTERVAL_SECONDS", "120");
        std::env::set_var("SKILLSWAP_MATCHING_THRESHOLD", "90");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.database.url, "custom/path.db");
        assert_eq!(config.session.timeout_minutes, 15);
        assert_eq!(config.session.sweep_interval_seconds, 120);
        assert_eq!(config.matching.threshold, 90);

        clear_env();
    }

    #[test]
    fn test_env_invalid_values_ignored() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();

        std::env::set_var("SKILLSWAP_SERVER_PORT", "not_a_number");
        std::env::set_var("SKILLSWAP_MATCHING_THRESHOLD", "250");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.matching.threshold, 80);

        clear_env();
    }

    #[test]
    fn test_env_empty_static_dir_disables_it() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  static_dir: \"public\"\n").unwrap();

        std::env::set_var("SKILLSWAP_SERVER_STATIC_DIR", "");

        let config = Config::load_with_env(file.path()).unwrap();
        assert!(config.server.static_dir.is_none());

        clear_env();
    }
}
