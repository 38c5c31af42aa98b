//! Credential resolution for an access email

use super::matcher::{matches, specificity};
use crate::storage::{StorageBackend, StorageError};
use crate::CredentialRecord;
use std::sync::Arc;

/// Pick the best record for `email` out of one application's records
///
/// The most specific matching pattern wins. Among equally specific patterns
/// the record listed first wins, so callers should pass records in
/// insertion order.
pub fn resolve<'a>(records: &'a [CredentialRecord], email: &str) -> Option<&'a CredentialRecord> {
    let mut best: Option<(i64, &CredentialRecord)> = None;

    for record in records
        .iter()
        .filter(|r| matches(&r.access_email_pattern, email))
    {
        let score = specificity(&record.access_email_pattern);
        match best {
            Some((top, _)) if top >= score => {}
            _ => best = Some((score, record)),
        }
    }

    best.map(|(_, record)| record)
}

/// Resolves credentials for a principal against the store
#[derive(Clone)]
pub struct CredentialResolver {
    /// Storage backend for retrieving credential records
    storage: Arc<dyn StorageBackend>,
}

impl CredentialResolver {
    /// Create a new resolver
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Resolve the credential `email` should use on `hostname`
    ///
    /// Reads the application's records fresh on every call.
    pub async fn resolve_for(
        &self,
        hostname: &str,
        email: &str,
    ) -> Result<Option<CredentialRecord>, StorageError> {
        let records = self.storage.list_credentials(hostname).await?;
        Ok(resolve(&records, email).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::ApplicationConfig;

    fn record(pattern: &str, username: &str) -> CredentialRecord {
        CredentialRecord::new(pattern, "app.example.com", username, format!("{}-pw", username))
    }

    fn standard_records() -> Vec<CredentialRecord> {
        vec![
            record("michiel@example.com", "admin"),
            record("*@example.com", "user"),
            record("*", "guest"),
        ]
    }

    #[test]
    fn test_exact_beats_wildcards() {
        let records = standard_records();
        let found = resolve(&records, "michiel@example.com").unwrap();
        assert_eq!(found.legacy_username, "admin");
    }

    #[test]
    fn test_domain_wildcard_fallback() {
        let records = standard_records();
        let found = resolve(&records, "employee@example.com").unwrap();
        assert_eq!(found.legacy_username, "user");
    }

    #[test]
    fn test_universal_fallback() {
        let records = standard_records();
        let found = resolve(&records, "anyone@other.com").unwrap();
        assert_eq!(found.legacy_username, "guest");
    }

    #[test]
    fn test_order_of_records_does_not_matter() {
        let mut records = standard_records();
        records.reverse();
        assert_eq!(resolve(&records, "michiel@example.com").unwrap().legacy_username, "admin");
        assert_eq!(resolve(&records, "employee@example.com").unwrap().legacy_username, "user");
    }

    #[test]
    fn test_no_match() {
        assert!(resolve(&[], "user@example.com").is_none());

        let records = vec![record("specific@example.com", "admin")];
        assert!(resolve(&records, "other@example.com").is_none());
    }

    #[test]
    fn test_multiple_domains() {
        let records = vec![
            record("*@company.com", "company_user"),
            record("*@example.com", "example_user"),
            record("*", "guest"),
        ];
        assert_eq!(resolve(&records, "user@company.com").unwrap().legacy_username, "company_user");
        assert_eq!(resolve(&records, "user@example.com").unwrap().legacy_username, "example_user");
        assert_eq!(resolve(&records, "user@other.com").unwrap().legacy_username, "guest");
    }

    #[test]
    fn test_ties_go_to_first_record() {
        let records = vec![
            record("*@example.com", "first"),
            record("*@EXAMPLE.com", "second"),
            record("*@example.com", "third"),
        ];
        assert_eq!(resolve(&records, "a@example.com").unwrap().legacy_username, "first");
    }

    #[tokio::test]
    async fn test_resolve_for_reads_storage() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .upsert_application(&ApplicationConfig::new(
                "app.example.com",
                "/login",
                "user",
                "pass",
                "Session",
            ))
            .await
            .unwrap();
        for r in standard_records() {
            storage.add_credential(&r).await.unwrap();
        }

        let resolver = CredentialResolver::new(storage);
        let found = resolver
            .resolve_for("app.example.com", "employee@example.com")
            .await
            .unwrap();
        assert_eq!(found.unwrap().legacy_username, "user");

        let missing = resolver
            .resolve_for("unknown.example.com", "employee@example.com")
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
