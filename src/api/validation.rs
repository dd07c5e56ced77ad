//! Input validation for submitted forms and URL segments.
//!
//! Validators return `Err(message)` with a user-facing explanation; handlers
//! decide whether that re-renders a form or becomes an [`ApiError`].
//!
//! [`ApiError`]: super::error::ApiError

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Usernames appear in dashboard URLs: alphanumeric start, then `[A-Za-z0-9_.-]`
    static ref USERNAME_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9][A-Za-z0-9_.-]{2,31}$"
    ).unwrap();

    /// Loose email shape check (something@something.tld)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    /// Strict ISO calendar date
    static ref ISO_DATE_REGEX: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}$"
    ).unwrap();
}

/// First path segments owned by fixed routes; a user with one of these names
/// could never reach their dashboard.
const RESERVED_USERNAMES: [&str; 14] = [
    "account", "add-task", "destroy", "done", "edit", "health", "login", "logout", "register",
    "static", "undone", "upcoming", "view", "favicon.ico",
];

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MAX_EVENT_LEN: usize = 500;

/// Validate a username
pub fn validate_username(username: &str) -> Result<(), String> {
    let username = username.trim();
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-', starting with a letter or digit".to_string()
        );
    }

    let lower = username.to_lowercase();
    if RESERVED_USERNAMES.contains(&lower.as_str()) {
        return Err("That username is reserved".to_string());
    }

    Ok(())
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate a new password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }

    if password.len() > MAX_PASSWORD_LEN {
        return Err(format!(
            "Password is too long (max {} characters)",
            MAX_PASSWORD_LEN
        ));
    }

    Ok(())
}

/// Validate a task description, returning it trimmed
pub fn validate_event(event: &str) -> Result<String, String> {
    let event = event.trim();
    if event.is_empty() {
        return Err("Task description is required".to_string());
    }

    if event.chars().count() > MAX_EVENT_LEN {
        return Err(format!(
            "Task description is too long (max {} characters)",
            MAX_EVENT_LEN
        ));
    }

    Ok(event.to_string())
}

/// Parse a literal `YYYY-MM-DD` date
pub fn parse_iso_date(input: &str) -> Result<NaiveDate, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Date is required".to_string());
    }

    if !ISO_DATE_REGEX.is_match(input) {
        return Err(format!("Invalid date '{}': expected YYYY-MM-DD", input));
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}': no such calendar day", input))
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}
