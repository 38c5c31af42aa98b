//! In-memory storage backend

use super::{StorageBackend, StorageError};
use crate::{ApplicationConfig, CredentialRecord};
use async_trait::async_trait;
use parking_lot::RwLock;

/// Process-local tables; contents are lost on restart
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    applications: Vec<ApplicationConfig>,
    /// Kept in insertion order
    credentials: Vec<CredentialRecord>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get_application(
        &self,
        hostname: &str,
    ) -> Result<Option<ApplicationConfig>, StorageError> {
        let tables = self.tables.read();
        Ok(tables
            .applications
            .iter()
            .find(|a| a.hostname.eq_ignore_ascii_case(hostname))
            .cloned())
    }

    async fn list_applications(&self) -> Result<Vec<ApplicationConfig>, StorageError> {
        let tables = self.tables.read();
        Ok(tables.applications.clone())
    }

    async fn list_credentials(
        &self,
        hostname: &str,
    ) -> Result<Vec<CredentialRecord>, StorageError> {
        let tables = self.tables.read();
        Ok(tables
            .credentials
            .iter()
            .filter(|c| c.app_hostname.eq_ignore_ascii_case(hostname))
            .cloned()
            .collect())
    }

    async fn upsert_application(&self, app: &ApplicationConfig) -> Result<(), StorageError> {
        app.validate().map_err(StorageError::InvalidRecord)?;

        let mut tables = self.tables.write();
        match tables
            .applications
            .iter_mut()
            .find(|a| a.hostname.eq_ignore_ascii_case(&app.hostname))
        {
            Some(existing) => *existing = app.clone(),
            None => tables.applications.push(app.clone()),
        }
        Ok(())
    }

    async fn delete_application(&self, hostname: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        let before = tables.applications.len();
        tables
            .applications
            .retain(|a| !a.hostname.eq_ignore_ascii_case(hostname));
        if tables.applications.len() == before {
            return Err(StorageError::ApplicationNotFound(hostname.to_string()));
        }
        tables
            .credentials
            .retain(|c| !c.app_hostname.eq_ignore_ascii_case(hostname));
        Ok(())
    }

    async fn add_credential(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        record.validate().map_err(StorageError::InvalidRecord)?;

        let mut tables = self.tables.write();
        if !tables
            .applications
            .iter()
            .any(|a| a.hostname.eq_ignore_ascii_case(&record.app_hostname))
        {
            return Err(StorageError::ApplicationNotFound(record.app_hostname.clone()));
        }
        tables.credentials.push(record.clone());
        Ok(())
    }

    async fn delete_credentials(
        &self,
        hostname: &str,
        access_email_pattern: &str,
    ) -> Result<u64, StorageError> {
        let mut tables = self.tables.write();
        let before = tables.credentials.len();
        tables.credentials.retain(|c| {
            !(c.app_hostname.eq_ignore_ascii_case(hostname)
                && c.access_email_pattern == access_email_pattern)
        });
        Ok((before - tables.credentials.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wiki() -> ApplicationConfig {
        ApplicationConfig::new("wiki.example.com", "/login", "user", "pass", "WikiSession")
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let storage = MemoryStorage::new();
        storage.upsert_application(&wiki()).await.unwrap();

        let found = storage.get_application("WIKI.example.com").await.unwrap();
        assert_eq!(found.unwrap().hostname, "wiki.example.com");
        assert!(storage.get_application("other.example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let storage = MemoryStorage::new();
        storage.upsert_application(&wiki()).await.unwrap();
        storage
            .upsert_application(&wiki().with_auto_login(false))
            .await
            .unwrap();

        let apps = storage.list_applications().await.unwrap();
        assert_eq!(apps.len(), 1);
        assert!(!apps[0].auto_login);
    }

    #[tokio::test]
    async fn test_credentials_keep_insertion_order_and_duplicates() {
        let storage = MemoryStorage::new();
        storage.upsert_application(&wiki()).await.unwrap();
        for user in ["first", "second"] {
            storage
                .add_credential(&CredentialRecord::new("*@example.com", "wiki.example.com", user, "pw"))
                .await
                .unwrap();
        }

        let records = storage.list_credentials("wiki.example.com").await.unwrap();
        let users: Vec<_> = records.iter().map(|r| r.legacy_username.as_str()).collect();
        assert_eq!(users, vec!["first", "second"]);

        let removed = storage
            .delete_credentials("wiki.example.com", "*@example.com")
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn test_credential_requires_application() {
        let storage = MemoryStorage::new();
        let err = storage
            .add_credential(&CredentialRecord::new("*", "missing.example.com", "u", "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ApplicationNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_application_cascades() {
        let storage = MemoryStorage::new();
        storage.upsert_application(&wiki()).await.unwrap();
        storage
            .add_credential(&CredentialRecord::new("*", "wiki.example.com", "u", "p"))
            .await
            .unwrap();

        storage.delete_application("wiki.example.com").await.unwrap();
        assert!(storage.list_credentials("wiki.example.com").await.unwrap().is_empty());
    }
}
