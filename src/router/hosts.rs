//! Hostname routing

use crate::storage::{StorageBackend, StorageError};
use crate::ApplicationConfig;
use std::sync::Arc;

/// Where an inbound request should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The reserved administration hostname
    Admin,
    /// A configured legacy application
    Application(ApplicationConfig),
    /// No configuration: relay everything unchanged
    Passthrough,
}

/// Resolves inbound hostnames to routes
#[derive(Clone)]
pub struct HostRouter {
    storage: Arc<dyn StorageBackend>,
    /// Lowercase admin hostname, if one is reserved
    admin_hostname: Option<String>,
}

impl HostRouter {
    /// Create a new router
    pub fn new(storage: Arc<dyn StorageBackend>, admin_hostname: Option<String>) -> Self {
        Self {
            storage,
            admin_hostname: admin_hostname.map(|h| h.to_ascii_lowercase()),
        }
    }

    /// Route a normalized hostname
    pub async fn route(&self, hostname: &str) -> Result<Route, StorageError> {
        if self.admin_hostname.as_deref() == Some(hostname) {
            return Ok(Route::Admin);
        }

        Ok(match self.storage.get_application(hostname).await? {
            Some(app) => Route::Application(app),
            None => Route::Passthrough,
        })
    }
}

/// Lowercase a `Host` value and strip any port
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();

    // Bracketed IPv6 literal, e.g. "[::1]:8080"
    if let Some(rest) = raw.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return format!("[{}]", rest[..end].to_ascii_lowercase());
        }
    }

    let host = match raw.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => raw,
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}
