//! User model
//!
//! Accounts carry their skill lists and spoken languages as comma-joined
//! free text. They are only split and normalized when matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Login name; always the account's lower-cased email
    pub username: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    /// Comma-separated spoken languages
    pub preferred_language: String,
    /// Comma-separated skills this user can teach
    pub skills_have: String,
    /// Comma-separated skills this user wants to learn
    pub skills_want: String,
    /// Opaque client hint supplied at registration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<String>,
    /// True iff at least one session of this user is active
    pub is_online: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new, offline user.
    ///
    /// The password should already be hashed, see `services::password::hash_password()`.
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: 0, // Will be set by the database
            username: username.into(),
            password_hash: password_hash.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            preferred_language: "English".to_string(),
            skills_have: String::new(),
            skills_want: String::new(),
            device_fingerprint: None,
            is_online: false,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    /// Set the comma-joined skill lists
    pub fn with_skills(mut self, have: impl Into<String>, want: impl Into<String>) -> Self {
        self.skills_have = have.into();
        self.skills_want = want.into();
        self
    }

    /// Set the comma-joined language list
    pub fn with_languages(mut self, languages: impl Into<String>) -> Self {
        self.preferred_language = languages.into();
        self
    }

    /// "First Last"
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// The public face of a user returned after login and in match listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new() {
        let user = User::new("alice@example.com", "hash", "Alice", "Smith");

        assert_eq!(user.id, 0);
        assert_eq!(user.username, "alice@example.com");
        assert_eq!(user.preferred_language, "English");
        assert!(user.skills_have.is_empty());
        assert!(!user.is_online);
        assert!(user.last_login.is_none());
    }

    #[test]
    fn test_user_builders() {
        let user = User::new("bob@example.com", "hash", "Bob", "Jones")
            .with_skills("Python,Guitar", "Spanish")
            .with_languages("English, French");

        assert_eq!(user.skills_have, "Python,Guitar");
        assert_eq!(user.skills_want, "Spanish");
        assert_eq!(user.preferred_language, "English, French");
        assert_eq!(user.full_name(), "Bob Jones");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("carol@example.com", "secret-hash", "Carol", "White");
        let json = serde_json::to_value(&user).unwrap();

        assert!(json.get("password_hash").is_none());
        assert!(json.get("device_fingerprint").is_none());
        assert_eq!(json["username"], "carol@example.com");
    }

    #[test]
    fn test_summary_uses_camel_case() {
        let mut user = User::new("dave@example.com", "hash", "Dave", "Brown");
        user.id = 7;
        let json = serde_json::to_value(UserSummary::from(&user)).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["firstName"], "Dave");
        assert_eq!(json["lastName"], "Brown");
    }
}
