//! Persistence contract for API keys, client credentials and token pairs.
//!
//! One [`CredentialStore`] instance serves exactly one tenant database. The
//! services never see SQL; they only depend on this trait, which has a SQLite
//! implementation for deployments and an in-memory one for development and
//! tests.
//!
//! # Uniqueness
//!
//! `client_id`, `client_secret`, `access_token` and `refresh_token` are each
//! unique among live (non-deleted) rows. Implementations enforce this on
//! write, so a value that slipped past [`CredentialStore::exists`] in a race
//! makes the save fail instead of being stored twice.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

use crate::error::CredentialError;

mod memory;
pub mod registry;
mod sqlite;

pub use memory::MemoryCredentialStore;
pub use registry::TenantRegistry;
pub use sqlite::SqliteCredentialStore;

/// The four value classes that must stay unique within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    ClientId,
    ClientSecret,
    AccessToken,
    RefreshToken,
}

impl ValueKind {
    /// Column holding this value in `message_api_credentials`.
    pub fn column(&self) -> &'static str {
        match self {
            ValueKind::ClientId => "client_id",
            ValueKind::ClientSecret => "client_secret",
            ValueKind::AccessToken => "access_token",
            ValueKind::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry. The refresh token never expires on its own.
    pub expires_at: DateTime<Utc>,
}

/// The stored access token for a user and when it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAccessToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Hash of the tenant's active API key, if one has been provisioned.
    async fn api_key_hash(&self) -> Result<Option<String>>;

    /// Appends a new API key hash; it becomes the active key.
    async fn add_api_key_hash(&self, hash: &str) -> Result<()>;

    async fn client_id(&self, user_id: i64) -> Result<Option<String>>;

    async fn client_secret(&self, user_id: i64) -> Result<Option<String>>;

    /// Whether `value` is already held in the `kind` column of a live row.
    async fn exists(&self, kind: ValueKind, value: &str) -> Result<bool>;

    /// Creates (or replaces) the user's credential row with fresh client
    /// credentials and token pair in a single write. On failure the previous
    /// row is left untouched.
    async fn save_registration(
        &self,
        user_id: i64,
        client_id: &str,
        client_secret: &str,
        pair: &TokenPair,
    ) -> Result<()>;

    /// Overwrites the user's token pair. Fails if the user has no credential
    /// row.
    async fn save_token_pair(&self, user_id: i64, pair: &TokenPair) -> Result<()>;

    async fn access_token(&self, user_id: i64) -> Result<Option<StoredAccessToken>>;

    async fn refresh_token(&self, user_id: i64) -> Result<Option<String>>;
}

/// Runs one store round-trip under `timeout`, wrapping failures with
/// `context` for the caller. The store future is dropped on timeout, so
/// implementations must not block the executor.
pub async fn bounded<T, F>(
    timeout: std::time::Duration,
    context: &'static str,
    call: F,
) -> std::result::Result<T, CredentialError>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(|e| CredentialError::store(context, e)),
        Err(_) => Err(CredentialError::store(
            context,
            anyhow!("store call timed out after {:?}", timeout),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let value = bounded(Duration::from_secs(1), "failed to get client_id", async {
            Ok(Some("cid".to_string()))
        })
        .await
        .unwrap();
        assert_eq!(value.as_deref(), Some("cid"));
    }

    #[tokio::test]
    async fn test_bounded_wraps_store_error() {
        let err = bounded(Duration::from_secs(1), "failed to get client_id", async {
            Err::<(), _>(anyhow!("disk I/O error"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.message(), "failed to get client_id");
        assert_eq!(err.detail(), "disk I/O error");
    }

    #[tokio::test]
    async fn test_bounded_gives_up_on_slow_call() {
        let started = Instant::now();
        let err = bounded(Duration::from_millis(50), "failed to get client_id", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(err.severity(), Severity::Internal);
        assert!(err.detail().contains("timed out"));
    }
}
