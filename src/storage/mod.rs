//! Storage backends for application configs and credential records
//!
//! The proxy only reads through this trait; the write half is the contract
//! the external administration surface relies on.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::config::{StorageBackendType, StorageConfig};
use crate::{ApplicationConfig, CredentialRecord};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Storage-related errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Trait for configuration and credential storage backends
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get the application served on `hostname` (case-insensitive)
    async fn get_application(
        &self,
        hostname: &str,
    ) -> Result<Option<ApplicationConfig>, StorageError>;

    /// List all applications
    async fn list_applications(&self) -> Result<Vec<ApplicationConfig>, StorageError>;

    /// List an application's credential records in insertion order
    async fn list_credentials(&self, hostname: &str)
        -> Result<Vec<CredentialRecord>, StorageError>;

    /// Insert an application, or update it if the hostname exists
    async fn upsert_application(&self, app: &ApplicationConfig) -> Result<(), StorageError>;

    /// Delete an application and its credential records
    async fn delete_application(&self, hostname: &str) -> Result<(), StorageError>;

    /// Add a credential record to an existing application
    async fn add_credential(&self, record: &CredentialRecord) -> Result<(), StorageError>;

    /// Delete every record with this pattern, returning how many were removed
    async fn delete_credentials(
        &self,
        hostname: &str,
        access_email_pattern: &str,
    ) -> Result<u64, StorageError>;

    /// Check if the storage backend is available and healthy
    async fn health_check(&self) -> Result<(), StorageError>;
}

/// Open the backend selected by the storage configuration
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    match config.backend {
        StorageBackendType::Sqlite => {
            let storage = SqliteStorage::connect(&config.path).await?;
            Ok(Arc::new(storage))
        }
        StorageBackendType::Memory => Ok(Arc::new(MemoryStorage::new())),
    }
}
