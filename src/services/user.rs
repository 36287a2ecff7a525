//! User service
//!
//! Implements business logic for user accounts:
//! - Registration with input validation and password hashing
//! - Login, which opens a session through [`SessionService`]
//! - Lookups and listings
//!
//! Login failures never reveal whether the account exists; the reason is
//! only written to the log.

use crate::db::repositories::{is_unique_violation, UserRepository};
use crate::models::{User, UserSummary};
use crate::services::password::{hash_password, verify_password};
use crate::services::session::{SessionService, SessionServiceError};
use crate::services::validation::{self, RegistrationFields};
use anyhow::Context;
use std::sync::Arc;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// User not found
    #[error("User not found")]
    NotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<validation::ValidationError> for UserServiceError {
    fn from(err: validation::ValidationError) -> Self {
        Self::ValidationError(err.0)
    }
}

impl From<SessionServiceError> for UserServiceError {
    fn from(err: SessionServiceError) -> Self {
        match err {
            SessionServiceError::UserNotFound(_) => Self::NotFound,
            SessionServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Result of a successful login
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoginOutcome {
    pub user: UserSummary,
    pub token: String,
}

/// User service for registration and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    sessions: Arc<SessionService>,
}

impl UserService {
    /// Create a new user service
    pub fn new(user_repo: Arc<dyn UserRepository>, sessions: Arc<SessionService>) -> Self {
        Self { user_repo, sessions }
    }

    /// Register a new user
    ///
    /// # Errors
    ///
    /// - `ValidationError` if any field fails validation
    /// - `UserExists` if the email is already registered
    /// - `InternalError` for database errors
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let valid = validation::validate_registration(&RegistrationFields {
            username: &input.username,
            password: &input.password,
            first_name: &input.first_name,
            last_name: &input.last_name,
            preferred_language: input.preferred_language.as_deref(),
            skills_have: &input.skills_have,
            skills_want: &input.skills_want,
            device_fingerprint: input.device_fingerprint.as_deref(),
        })?;

        if self
            .user_repo
            .get_by_username(&valid.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already registered",
                valid.username
            )));
        }

        let password_hash = hash_password(&valid.password).context("Failed to hash password")?;

        let mut user = User::new(valid.username, password_hash, valid.first_name, valid.last_name)
            .with_skills(valid.skills_have.join(","), valid.skills_want.join(","))
            .with_languages(valid.preferred_language);
        user.device_fingerprint = valid.device_fingerprint;

        // A concurrent registration can still win the race past the check above
        let created = match self.user_repo.create(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(format!(
                    "Username '{}' is already registered",
                    user.username
                )));
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        tracing::info!(user_id = created.id, username = %created.username, "User registered");
        Ok(created)
    }

    /// Login with credentials and open a session
    ///
    /// # Errors
    ///
    /// - `ValidationError` if a field is missing or malformed
    /// - `AuthenticationError` if the credentials do not match an account
    /// - `InternalError` for database errors
    pub async fn login(&self, input: LoginInput) -> Result<LoginOutcome, UserServiceError> {
        let username = validation::validate_login(&input.username, &input.password)?;

        let Some(user) = self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to get user by username")?
        else {
            tracing::warn!(username = %username, reason = "user_not_found", "Login failed");
            return Err(UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string()));
        };

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            tracing::warn!(username = %username, user_id = user.id, reason = "invalid_password", "Login failed");
            return Err(UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string()));
        }

        let session = self.sessions.create(user.id).await?;

        tracing::info!(user_id = user.id, username = %username, "Login succeeded");
        Ok(LoginOutcome {
            user: UserSummary::from(&user),
            token: session.token,
        })
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;

        Ok(user)
    }

    /// List all users in registration order
    pub async fn list(&self) -> Result<Vec<User>, UserServiceError> {
        let users = self.user_repo.list().await.context("Failed to list users")?;
        Ok(users)
    }
}

/// Input for user registration
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub preferred_language: Option<String>,
    #[serde(default)]
    pub skills_have: Vec<String>,
    #[serde(default)]
    pub skills_want: Vec<String>,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

impl RegisterInput {
    /// Create a registration input with no skills and the default language
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Default::default()
        }
    }

    /// Set the skills offered and wanted
    pub fn with_skills(mut self, have: &[&str], want: &[&str]) -> Self {
        self.skills_have = have.iter().map(|s| s.to_string()).collect();
        self.skills_want = want.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set the comma-separated spoken languages
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.preferred_language = Some(language.into());
        self
    }
}

/// Input for user login
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl LoginInput {
    /// Create a new login input
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, UserService, Arc<SessionService>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let sessions = Arc::new(SessionService::new(session_repo, user_repo.clone()));
        let service = UserService::new(user_repo, sessions.clone());

        (pool, service, sessions)
    }

    fn alice() -> RegisterInput {
        RegisterInput::new("Alice@Example.com", "password123", "alice", "smith")
            .with_skills(&["python", "guitar"], &["spanish"])
            .with_language(" English ")
    }

    // ========================================================================
    // Registration tests
    // ========================================================================

    #[tokio::test]
    async fn test_register_normalizes_and_stores() {
        let (_pool, service, _) = setup_test_service().await;

        let user = service.register(alice()).await.expect("Failed to register");

        assert!(user.id > 0);
        assert_eq!(user.username, "alice@example.com");
        assert_eq!(user.first_name, "Alice");
        assert_eq!(user.last_name, "Smith");
        assert_eq!(user.skills_have, "Python,Guitar");
        assert_eq!(user.skills_want, "Spanish");
        assert_eq!(user.preferred_language, "English");
        assert!(!user.is_online);
    }

    #[tokio::test]
    async fn test_register_duplicate_username_fails() {
        let (_pool, service, _) = setup_test_service().await;
        service.register(alice()).await.expect("Failed to register");

        let again = RegisterInput::new("alice@example.com", "password456", "Other", "Person");
        let result = service.register(again).await;

        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
    }

    /// Lookups that miss, as when a concurrent registration commits between
    /// the duplicate check and the insert
    struct LaggingLookupRepo(Arc<dyn UserRepository>);

    #[async_trait::async_trait]
    impl UserRepository for LaggingLookupRepo {
        async fn create(&self, user: &User) -> anyhow::Result<User> {
            self.0.create(user).await
        }

        async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
            self.0.get_by_id(id).await
        }

        async fn get_by_username(&self, _username: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn list(&self) -> anyhow::Result<Vec<User>> {
            self.0.list().await
        }
    }

    #[tokio::test]
    async fn test_register_conflicting_insert_reports_user_exists() {
        let (pool, _service, sessions) = setup_test_service().await;
        let user_repo = SqlxUserRepository::boxed(pool);
        user_repo
            .create(&User::new("alice@example.com", "hash", "Alice", "Smith"))
            .await
            .unwrap();

        let service = UserService::new(Arc::new(LaggingLookupRepo(user_repo.clone())), sessions);
        let result = service.register(alice()).await;

        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
        assert_eq!(user_repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_invalid_input_fails() {
        let (_pool, service, _) = setup_test_service().await;

        let bad_email = RegisterInput::new("not-an-email", "password123", "Ann", "Lee");
        let weak_password = RegisterInput::new("ann@example.com", "short", "Ann", "Lee");
        let bad_name = RegisterInput::new("ann@example.com", "password123", "A", "Lee");

        for input in [bad_email, weak_password, bad_name] {
            assert!(matches!(
                service.register(input).await,
                Err(UserServiceError::ValidationError(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_password_is_hashed() {
        let (_pool, service, _) = setup_test_service().await;

        let user = service.register(alice()).await.unwrap();

        assert_ne!(user.password_hash, "password123");
        assert!(user.password_hash.starts_with("$argon2"));
    }

    // ========================================================================
    // Login tests
    // ========================================================================

    #[tokio::test]
    async fn test_login_success_opens_session() {
        let (_pool, service, sessions) = setup_test_service().await;
        let registered = service.register(alice()).await.unwrap();

        let outcome = service
            .login(LoginInput::new(" ALICE@example.com ", "password123"))
            .await
            .expect("Login should succeed");

        assert_eq!(outcome.user.id, registered.id);
        assert_eq!(outcome.user.first_name, "Alice");
        let validated = sessions.validate(&outcome.token).await.unwrap().unwrap();
        assert_eq!(validated.id, registered.id);
        assert!(validated.is_online);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (_pool, service, _) = setup_test_service().await;
        service.register(alice()).await.unwrap();

        let wrong_password = service
            .login(LoginInput::new("alice@example.com", "wrongpass1"))
            .await
            .unwrap_err();
        let unknown_user = service
            .login(LoginInput::new("nobody@example.com", "password123"))
            .await
            .unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert!(matches!(wrong_password, UserServiceError::AuthenticationError(_)));
    }

    #[tokio::test]
    async fn test_login_missing_fields() {
        let (_pool, service, _) = setup_test_service().await;

        let result = service.login(LoginInput::new("", "password123")).await;

        assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_get_by_id_and_list() {
        let (_pool, service, _) = setup_test_service().await;
        let user = service.register(alice()).await.unwrap();
        service
            .register(RegisterInput::new("bob@example.com", "password123", "Bob", "Jones"))
            .await
            .unwrap();

        assert_eq!(service.get_by_id(user.id).await.unwrap().unwrap().id, user.id);
        assert!(service.get_by_id(999).await.unwrap().is_none());
        assert_eq!(service.list().await.unwrap().len(), 2);
    }

    #[test]
    fn test_register_input_deserializes_camel_case() {
        let input: RegisterInput = serde_json::from_str(
            r#"{"username":"a@b.co","password":"x","firstName":"A","lastName":"B","skillsHave":["Rust"]}"#,
        )
        .unwrap();

        assert_eq!(input.first_name, "A");
        assert_eq!(input.skills_have, vec!["Rust"]);
        assert!(input.skills_want.is_empty());
        assert!(input.preferred_language.is_none());
    }
}
