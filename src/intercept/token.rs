//! Placeholder password tokens
//!
//! A token stands in for the real password in a prefilled login page and is
//! swapped for the real one when the form comes back. It is a plain function
//! of the principal's email and the UTC calendar day, so it is recomputed on
//! submission rather than stored. It is not a secret.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::fmt;

/// Same-day correlation marker for one principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordToken(String);

impl PasswordToken {
    /// Derive the token for `email` on `day`
    pub fn derive(email: &str, day: NaiveDate) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(email.as_bytes());
        hasher.update(b"\n");
        hasher.update(day.format("%Y-%m-%d").to_string().as_bytes());
        Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    /// Derive the token for `email` on the current UTC day
    pub fn for_today(email: &str) -> Self {
        Self::derive(email, Utc::now().date_naive())
    }

    /// The token text as placed in the password field
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check a submitted password field against this token
    pub fn matches(&self, submitted: &str) -> bool {
        self.0 == submitted
    }
}

impl fmt::Display for PasswordToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_token_is_stable() {
        let a = PasswordToken::derive("alice@example.com", day(1));
        let b = PasswordToken::derive("alice@example.com", day(1));
        assert_eq!(a, b);
        assert!(a.matches(b.as_str()));
    }

    #[test]
    fn test_token_depends_on_email() {
        let a = PasswordToken::derive("alice@example.com", day(1));
        let b = PasswordToken::derive("bob@example.com", day(1));
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_depends_on_day() {
        let a = PasswordToken::derive("alice@example.com", day(1));
        let b = PasswordToken::derive("alice@example.com", day(2));
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_is_form_safe() {
        let token = PasswordToken::derive("alice@example.com", day(1));
        assert_eq!(token.as_str().len(), 43);
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_for_today_matches_derive() {
        let today = Utc::now().date_naive();
        assert_eq!(
            PasswordToken::for_today("alice@example.com"),
            PasswordToken::derive("alice@example.com", today)
        );
    }
}
