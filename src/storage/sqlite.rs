//! SQLite storage backend
//!
//! Schema:
//!
//! ```sql
//! app_config(hostname PK, login_path, username_field, password_field,
//!            session_cookie, auto_login DEFAULT 1)
//! user_credentials(id PK AUTOINCREMENT, access_email, app_hostname FK,
//!                  legacy_username, legacy_password)
//! ```
//!
//! `(app_hostname, access_email)` is deliberately not unique.

use super::{StorageBackend, StorageError};
use crate::{ApplicationConfig, CredentialRecord, Secret};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use tokio::fs;

const CREATE_APP_CONFIG: &str = r#"
CREATE TABLE IF NOT EXISTS app_config (
    hostname        TEXT PRIMARY KEY NOT NULL COLLATE NOCASE,
    login_path      TEXT NOT NULL,
    username_field  TEXT NOT NULL,
    password_field  TEXT NOT NULL,
    session_cookie  TEXT NOT NULL,
    auto_login      INTEGER NOT NULL DEFAULT 1
)
"#;

const CREATE_USER_CREDENTIALS: &str = r#"
CREATE TABLE IF NOT EXISTS user_credentials (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    access_email    TEXT NOT NULL,
    app_hostname    TEXT NOT NULL COLLATE NOCASE
                    REFERENCES app_config(hostname) ON DELETE CASCADE,
    legacy_username TEXT NOT NULL,
    legacy_password TEXT NOT NULL
)
"#;

const CREATE_CREDENTIALS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_user_credentials_app ON user_credentials(app_hostname)
"#;

/// Storage backed by a SQLite database file
pub struct SqliteStorage {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct AppRow {
    hostname: String,
    login_path: String,
    username_field: String,
    password_field: String,
    session_cookie: String,
    auto_login: bool,
}

impl From<AppRow> for ApplicationConfig {
    fn from(row: AppRow) -> Self {
        Self {
            hostname: row.hostname,
            login_path: row.login_path,
            username_field: row.username_field,
            password_field: row.password_field,
            session_cookie: row.session_cookie,
            auto_login: row.auto_login,
        }
    }
}

#[derive(FromRow)]
struct CredentialRow {
    access_email: String,
    app_hostname: String,
    legacy_username: String,
    legacy_password: String,
}

impl From<CredentialRow> for CredentialRecord {
    fn from(row: CredentialRow) -> Self {
        Self {
            access_email_pattern: row.access_email,
            app_hostname: row.app_hostname,
            legacy_username: row.legacy_username,
            legacy_password: Secret::new(row.legacy_password),
        }
    }
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `path` and ensure the schema
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;

        tracing::debug!(path = %path.display(), "Opened SQLite storage");
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in [
            CREATE_APP_CONFIG,
            CREATE_USER_CREDENTIALS,
            CREATE_CREDENTIALS_INDEX,
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn get_application(
        &self,
        hostname: &str,
    ) -> Result<Option<ApplicationConfig>, StorageError> {
        let row = sqlx::query_as::<_, AppRow>(
            "SELECT hostname, login_path, username_field, password_field, session_cookie, auto_login \
             FROM app_config WHERE hostname = ?1",
        )
        .bind(hostname)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ApplicationConfig::from))
    }

    async fn list_applications(&self) -> Result<Vec<ApplicationConfig>, StorageError> {
        let rows = sqlx::query_as::<_, AppRow>(
            "SELECT hostname, login_path, username_field, password_field, session_cookie, auto_login \
             FROM app_config ORDER BY hostname",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ApplicationConfig::from).collect())
    }

    async fn list_credentials(
        &self,
        hostname: &str,
    ) -> Result<Vec<CredentialRecord>, StorageError> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            "SELECT access_email, app_hostname, legacy_username, legacy_password \
             FROM user_credentials WHERE app_hostname = ?1 ORDER BY id",
        )
        .bind(hostname)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CredentialRecord::from).collect())
    }

    async fn upsert_application(&self, app: &ApplicationConfig) -> Result<(), StorageError> {
        app.validate().map_err(StorageError::InvalidRecord)?;

        sqlx::query(
            "INSERT INTO app_config \
             (hostname, login_path, username_field, password_field, session_cookie, auto_login) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(hostname) DO UPDATE SET \
             login_path = excluded.login_path, \
             username_field = excluded.username_field, \
             password_field = excluded.password_field, \
             session_cookie = excluded.session_cookie, \
             auto_login = excluded.auto_login",
        )
        .bind(&app.hostname)
        .bind(&app.login_path)
        .bind(&app.username_field)
        .bind(&app.password_field)
        .bind(&app.session_cookie)
        .bind(app.auto_login)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_application(&self, hostname: &str) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM app_config WHERE hostname = ?1")
            .bind(hostname)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ApplicationNotFound(hostname.to_string()));
        }
        Ok(())
    }

    async fn add_credential(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        record.validate().map_err(StorageError::InvalidRecord)?;

        if self.get_application(&record.app_hostname).await?.is_none() {
            return Err(StorageError::ApplicationNotFound(record.app_hostname.clone()));
        }

        sqlx::query(
            "INSERT INTO user_credentials \
             (access_email, app_hostname, legacy_username, legacy_password) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&record.access_email_pattern)
        .bind(&record.app_hostname)
        .bind(&record.legacy_username)
        .bind(record.legacy_password.expose())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_credentials(
        &self,
        hostname: &str,
        access_email_pattern: &str,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "DELETE FROM user_credentials WHERE app_hostname = ?1 AND access_email = ?2",
        )
        .bind(hostname)
        .bind(access_email_pattern)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
