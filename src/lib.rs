//! Portcullis - identity-aware login proxy for legacy web applications
//!
//! Portcullis sits behind a trusted identity layer that authenticates callers
//! and forwards their verified email in a header. For each configured legacy
//! application it logs the caller in with credentials mapped from that email,
//! so the browser never handles the real legacy password.

pub mod config;
pub mod intercept;
pub mod proxy;
pub mod router;
pub mod storage;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error types for Portcullis
#[derive(Error, Debug)]
pub enum PortcullisError {
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Origin request failed: {0}")]
    Forward(#[from] proxy::ForwardError),

    #[error("No legacy credential for {email} on {hostname}")]
    CredentialNotFound { hostname: String, email: String },

    #[error("Missing identity header")]
    MissingIdentity,

    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl PortcullisError {
    /// HTTP status reported to the caller for this error
    pub fn status(&self) -> StatusCode {
        match self {
            PortcullisError::Storage(_) | PortcullisError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PortcullisError::Forward(_) => StatusCode::BAD_GATEWAY,
            PortcullisError::CredentialNotFound { .. } | PortcullisError::MissingIdentity => {
                StatusCode::UNAUTHORIZED
            }
            PortcullisError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            PortcullisError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for PortcullisError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Don't echo the principal back on auth failures
            PortcullisError::CredentialNotFound { .. } | PortcullisError::MissingIdentity => {
                "Unauthorized".to_string()
            }
            PortcullisError::Storage(_) | PortcullisError::Config(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}

/// A secret string wrapper that redacts itself in `Debug` output
#[derive(Debug, Clone)]
pub struct Secret(SecretString);

impl Secret {
    /// Create a new secret from a string
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Expose the secret value
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

fn default_auto_login() -> bool {
    true
}

/// Login settings for one legacy application, keyed by hostname
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// Public hostname the application is served on (unique)
    pub hostname: String,
    /// Exact path of the login form (e.g. "/login")
    pub login_path: String,
    /// Name of the username form field
    pub username_field: String,
    /// Name of the password form field
    pub password_field: String,
    /// Cookie that marks an established legacy session
    pub session_cookie: String,
    /// Submit credentials server-side instead of prefilling the page
    #[serde(default = "default_auto_login")]
    pub auto_login: bool,
}

impl ApplicationConfig {
    /// Create an application config with auto-login enabled
    pub fn new(
        hostname: impl Into<String>,
        login_path: impl Into<String>,
        username_field: impl Into<String>,
        password_field: impl Into<String>,
        session_cookie: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            login_path: login_path.into(),
            username_field: username_field.into(),
            password_field: password_field.into(),
            session_cookie: session_cookie.into(),
            auto_login: true,
        }
    }

    /// Set the auto-login flag
    pub fn with_auto_login(mut self, auto_login: bool) -> Self {
        self.auto_login = auto_login;
        self
    }

    /// Check that every field is non-empty
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("hostname", &self.hostname),
            ("login_path", &self.login_path),
            ("username_field", &self.username_field),
            ("password_field", &self.password_field),
            ("session_cookie", &self.session_cookie),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(format!("{} must not be empty", name));
            }
        }
        Ok(())
    }
}

/// A mapping from an access email pattern to legacy login credentials
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    /// Exact email, or a pattern where `*` matches any run of characters
    pub access_email_pattern: String,
    /// Hostname of the application this record belongs to
    pub app_hostname: String,
    /// Username for the legacy application
    pub legacy_username: String,
    /// Password for the legacy application
    pub legacy_password: Secret,
}

impl CredentialRecord {
    /// Create a new credential record
    pub fn new(
        access_email_pattern: impl Into<String>,
        app_hostname: impl Into<String>,
        legacy_username: impl Into<String>,
        legacy_password: impl Into<Secret>,
    ) -> Self {
        Self {
            access_email_pattern: access_email_pattern.into(),
            app_hostname: app_hostname.into(),
            legacy_username: legacy_username.into(),
            legacy_password: legacy_password.into(),
        }
    }

    /// Check that every field is non-empty
    pub fn validate(&self) -> Result<(), String> {
        if self.access_email_pattern.trim().is_empty() {
            return Err("access_email_pattern must not be empty".to_string());
        }
        if self.app_hostname.trim().is_empty() {
            return Err("app_hostname must not be empty".to_string());
        }
        if self.legacy_username.is_empty() || self.legacy_password.expose().is_empty() {
            return Err("legacy credentials must not be empty".to_string());
        }
        Ok(())
    }
}
