//! Input validation and sanitization for registration and login
//!
//! Rejections carry a human-readable reason that is passed straight to the
//! client.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z\s'-]{2,50}$").expect("valid name regex"));
static SKILL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\s+#.-]{2,100}$").expect("valid skill regex"));

const MAX_EMAIL_LEN: usize = 254;
const MAX_NAME_LEN: usize = 50;
const MAX_SKILL_LEN: usize = 100;
const MAX_SKILLS: usize = 20;
const MAX_LANGUAGE_LEN: usize = 50;
const MAX_FINGERPRINT_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

/// Input rejected before it reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Registration fields after validation and normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub preferred_language: String,
    pub skills_have: Vec<String>,
    pub skills_want: Vec<String>,
    pub device_fingerprint: Option<String>,
}

/// Trim, cap at `max_len` characters and HTML-escape
pub fn sanitize_string(value: &str, max_len: usize) -> String {
    let truncated: String = value.trim().chars().take(max_len).collect();
    escape_html(&truncated)
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Upper-case every letter that follows a non-letter, lower-case the rest
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_is_letter = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

fn truncate_trimmed(value: &str, max_len: usize) -> String {
    value.trim().chars().take(max_len).collect()
}

/// Validate an email address and return it lower-cased
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = sanitize_string(email, MAX_EMAIL_LEN);

    if email.is_empty() {
        return Err(ValidationError::new("Email is required"));
    }
    if !EMAIL_PATTERN.is_match(&email) {
        return Err(ValidationError::new("Invalid email format"));
    }

    Ok(email.to_lowercase())
}

/// Check password length and that it mixes letters and digits
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            "Password must be at least 8 characters long",
        ));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ValidationError::new("Password is too long"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new(
            "Password must contain at least one digit",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::new(
            "Password must contain at least one letter",
        ));
    }
    Ok(())
}

/// Validate a person's name and return it title-cased
pub fn validate_name(name: &str, field_name: &str) -> Result<String, ValidationError> {
    // The pattern admits no markup characters, so there is nothing to escape.
    let name = truncate_trimmed(name, MAX_NAME_LEN);

    if name.is_empty() {
        return Err(ValidationError(format!("{} is required", field_name)));
    }
    if !NAME_PATTERN.is_match(&name) {
        return Err(ValidationError(format!(
            "{} contains invalid characters",
            field_name
        )));
    }

    Ok(title_case(&name))
}

/// Validate a skill list: blank entries are skipped, the rest title-cased and
/// de-duplicated in first-seen order
pub fn validate_skills(skills: &[String]) -> Result<Vec<String>, ValidationError> {
    if skills.len() > MAX_SKILLS {
        return Err(ValidationError::new("Too many skills (maximum 20)"));
    }

    let mut validated: Vec<String> = Vec::new();
    for skill in skills {
        let skill = truncate_trimmed(skill, MAX_SKILL_LEN);
        if skill.is_empty() {
            continue;
        }
        if !SKILL_PATTERN.is_match(&skill) {
            return Err(ValidationError(format!(
                "Invalid skill: {}",
                escape_html(&skill)
            )));
        }
        let skill = title_case(&skill);
        if !validated.contains(&skill) {
            validated.push(skill);
        }
    }

    Ok(validated)
}

/// Raw registration fields as submitted by a client
#[derive(Debug, Clone, Default)]
pub struct RegistrationFields<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub preferred_language: Option<&'a str>,
    pub skills_have: &'a [String],
    pub skills_want: &'a [String],
    pub device_fingerprint: Option<&'a str>,
}

/// Validate a complete registration
pub fn validate_registration(
    fields: &RegistrationFields<'_>,
) -> Result<ValidRegistration, ValidationError> {
    let username = validate_email(fields.username)?;
    validate_password(fields.password)?;
    let first_name = validate_name(fields.first_name, "First name")?;
    let last_name = validate_name(fields.last_name, "Last name")?;

    let preferred_language = fields
        .preferred_language
        .map(|l| sanitize_string(l, MAX_LANGUAGE_LEN))
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "English".to_string());

    let skills_have = validate_skills(fields.skills_have)?;
    let skills_want = validate_skills(fields.skills_want)?;

    let device_fingerprint = fields
        .device_fingerprint
        .map(|fp| sanitize_string(fp, MAX_FINGERPRINT_LEN))
        .filter(|fp| !fp.is_empty());

    Ok(ValidRegistration {
        username,
        password: fields.password.to_string(),
        first_name,
        last_name,
        preferred_language,
        skills_have,
        skills_want,
        device_fingerprint,
    })
}

/// Validate login fields and return the normalized username.
///
/// The password format is not checked on login.
pub fn validate_login(username: &str, password: &str) -> Result<String, ValidationError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ValidationError::new("Email is required"));
    }
    if password.is_empty() {
        return Err(ValidationError::new("Password is required"));
    }

    if username.contains('@') {
        validate_email(username)
    } else {
        Ok(username.to_string())
    }
}
