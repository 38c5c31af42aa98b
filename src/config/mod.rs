//! Configuration system for Portcullis
//!
//! Loads configuration from TOML files; every section is optional and falls
//! back to defaults.

mod types;

pub use types::*;

use axum::http::{HeaderMap, HeaderName};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// Default name of the header carrying the authenticated principal's email
pub const DEFAULT_IDENTITY_HEADER: &str = "cf-access-authenticated-user-email";

/// Email used when the identity header is absent
pub const DEFAULT_FALLBACK_EMAIL: &str = "unknown@example.com";

/// Default bind address for the proxy listener
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Default cap on buffered request bodies (10 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main Portcullis configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,
    /// Trusted identity header handling
    pub identity: IdentityConfig,
    /// Administration hostname routing
    pub admin: AdminConfig,
    /// How origins are reached
    pub upstream: UpstreamConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Load configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Self::from_raw(raw)
    }

    /// Convert from raw TOML config to validated config
    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            server: raw.server.unwrap_or_default().try_into()?,
            identity: raw.identity.unwrap_or_default().try_into()?,
            admin: raw.admin.unwrap_or_default().try_into()?,
            upstream: raw.upstream.unwrap_or_default().try_into()?,
            storage: raw.storage.unwrap_or_default().try_into()?,
            logging: raw.logging.unwrap_or_default().into(),
        })
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("portcullis")
            .join("config.toml")
    }

    /// Get the default database path
    pub fn default_database_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("portcullis")
            .join("portcullis.db")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            identity: IdentityConfig::default(),
            admin: AdminConfig::default(),
            upstream: UpstreamConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
    /// Largest request body the proxy will buffer
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Trusted identity header configuration
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Header set by the identity layer
    pub header: HeaderName,
    /// Placeholder email used when the header is missing
    pub fallback_email: String,
}

impl IdentityConfig {
    /// The authenticated principal's email, if the header is present
    pub fn asserted_email(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// The principal's email, or the fallback placeholder
    pub fn principal_email(&self, headers: &HeaderMap) -> String {
        self.asserted_email(headers)
            .unwrap_or_else(|| self.fallback_email.clone())
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_IDENTITY_HEADER),
            fallback_email: DEFAULT_FALLBACK_EMAIL.to_string(),
        }
    }
}

/// Administration hostname routing
#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    /// Reserved hostname for the admin surface (lowercase)
    pub hostname: Option<String>,
    /// Base URL of the external admin service
    pub upstream: Option<String>,
}

/// How the proxy reaches legacy origins
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Scheme used when no override exists ("http" or "https")
    pub scheme: String,
    /// Optional per-request timeout for origin calls
    pub timeout: Option<Duration>,
    /// Hostname (lowercase) to origin base URL, without trailing slash
    pub overrides: HashMap<String, String>,
}

impl UpstreamConfig {
    /// Base URL of the origin serving `hostname`
    pub fn origin_base(&self, hostname: &str) -> String {
        match self.overrides.get(hostname) {
            Some(base) => base.clone(),
            None => format!("{}://{}", self.scheme, hostname),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            timeout: None,
            overrides: HashMap::new(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackendType,
    /// Database file for the SQLite backend
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::Sqlite,
            path: Config::default_database_path(),
        }
    }
}

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendType {
    /// SQLite database file
    Sqlite,
    /// Process-local tables, empty on start
    Memory,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Format: "json" or "pretty"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format
    Pretty,
    /// JSON format
    Json,
}
