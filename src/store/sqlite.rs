//! Credential storage using SQLite.
//!
//! One database file per tenant. Lookups always ignore soft-deleted rows.
//! rusqlite is synchronous, so every statement runs on tokio's blocking pool
//! and the async side only awaits its completion.

use super::{CredentialStore, StoredAccessToken, TokenPair, ValueKind};
use crate::clock::Clock;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE message_api_keys (
///     id INTEGER PRIMARY KEY,
///     api_key TEXT NOT NULL,            -- SHA-256 hex of the plaintext key
///     created_at TEXT NOT NULL,
///     deleted_at TEXT
/// );
///
/// CREATE TABLE message_api_credentials (
///     id INTEGER PRIMARY KEY,
///     user_id INTEGER NOT NULL,
///     client_id TEXT NOT NULL,
///     client_secret TEXT NOT NULL,
///     access_token TEXT,
///     refresh_token TEXT,
///     expires_at TEXT,                  -- RFC 3339, access token only
///     created_at TEXT NOT NULL,
///     updated_at TEXT,
///     deleted_at TEXT
/// );
/// ```
///
/// `user_id` and each credential column carry a partial unique index over
/// rows with `deleted_at IS NULL`.
///
/// # Thread Safety
/// - Connection is wrapped in `Arc<Mutex>` and only touched from blocking tasks
pub struct SqliteCredentialStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteCredentialStore {
    /// Creates or opens a credential store and ensures the schema exists.
    pub fn new<P: AsRef<Path>>(db_path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open credential DB at {}", path.display()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS message_api_keys (
                id         INTEGER PRIMARY KEY,
                api_key    TEXT NOT NULL,
                created_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE TABLE IF NOT EXISTS message_api_credentials (
                id            INTEGER PRIMARY KEY,
                user_id       INTEGER NOT NULL,
                client_id     TEXT NOT NULL,
                client_secret TEXT NOT NULL,
                access_token  TEXT,
                refresh_token TEXT,
                expires_at    TEXT,
                created_at    TEXT NOT NULL,
                updated_at    TEXT,
                deleted_at    TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_user_id
                ON message_api_credentials(user_id) WHERE deleted_at IS NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_client_id
                ON message_api_credentials(client_id) WHERE deleted_at IS NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_client_secret
                ON message_api_credentials(client_secret) WHERE deleted_at IS NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_access_token
                ON message_api_credentials(access_token) WHERE deleted_at IS NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_refresh_token
                ON message_api_credentials(refresh_token) WHERE deleted_at IS NULL;
            "#,
        )
        .context("Failed to create credential schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| anyhow!("credential DB connection mutex poisoned"))?;
            f(&mut conn)
        })
        .await
        .context("Credential DB task failed")?
    }

    async fn query_column(&self, column: &'static str, user_id: i64) -> Result<Option<String>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM message_api_credentials WHERE user_id = ?1 AND deleted_at IS NULL LIMIT 1",
                column
            );
            let value: Option<Option<String>> = conn
                .query_row(&sql, params![user_id], |row| row.get(0))
                .optional()
                .with_context(|| format!("Failed to query {}", column))?;
            Ok(value.flatten())
        })
        .await
    }

    /// Soft-deletes the user's credential row, revoking its client
    /// credentials and tokens. Returns whether a row matched.
    pub async fn soft_delete(&self, user_id: i64) -> Result<bool> {
        let now = self.clock.now().to_rfc3339();
        self.with_conn(move |conn| {
            let rows = conn
                .execute(
                    "UPDATE message_api_credentials SET deleted_at = ?1 WHERE user_id = ?2 AND deleted_at IS NULL",
                    params![now, user_id],
                )
                .context("Failed to delete credentials")?;
            Ok(rows > 0)
        })
        .await
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse timestamp '{}'", value))
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn api_key_hash(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT api_key FROM message_api_keys WHERE deleted_at IS NULL ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query API key")
        })
        .await
    }

    async fn add_api_key_hash(&self, hash: &str) -> Result<()> {
        let hash = hash.to_string();
        let now = self.clock.now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO message_api_keys (api_key, created_at) VALUES (?1, ?2)",
                params![hash, now],
            )
            .context("Failed to insert API key")?;
            Ok(())
        })
        .await
    }

    async fn client_id(&self, user_id: i64) -> Result<Option<String>> {
        self.query_column("client_id", user_id).await
    }

    async fn client_secret(&self, user_id: i64) -> Result<Option<String>> {
        self.query_column("client_secret", user_id).await
    }

    async fn exists(&self, kind: ValueKind, value: &str) -> Result<bool> {
        let value = value.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT 1 FROM message_api_credentials WHERE {} = ?1 AND deleted_at IS NULL LIMIT 1",
                kind.column()
            );
            let found: Option<i64> = conn
                .query_row(&sql, params![value], |row| row.get(0))
                .optional()
                .with_context(|| format!("Failed to search {}", kind))?;
            Ok(found.is_some())
        })
        .await
    }

    async fn save_registration(
        &self,
        user_id: i64,
        client_id: &str,
        client_secret: &str,
        pair: &TokenPair,
    ) -> Result<()> {
        let values = (
            client_id.to_string(),
            client_secret.to_string(),
            pair.clone(),
        );
        let now = self.clock.now().to_rfc3339();
        self.with_conn(move |conn| {
            let (client_id, client_secret, pair) = values;
            conn.execute(
                r#"
                INSERT INTO message_api_credentials
                    (user_id, client_id, client_secret, access_token, refresh_token, expires_at, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(user_id) WHERE deleted_at IS NULL DO UPDATE SET
                    client_id = excluded.client_id,
                    client_secret = excluded.client_secret,
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.created_at
                "#,
                params![
                    user_id,
                    client_id,
                    client_secret,
                    pair.access_token,
                    pair.refresh_token,
                    pair.expires_at.to_rfc3339(),
                    now
                ],
            )
            .context("Failed to store registration")?;
            Ok(())
        })
        .await
    }

    async fn save_token_pair(&self, user_id: i64, pair: &TokenPair) -> Result<()> {
        let pair = pair.clone();
        let now = self.clock.now().to_rfc3339();
        self.with_conn(move |conn| {
            let rows = conn
                .execute(
                    r#"
                    UPDATE message_api_credentials
                    SET access_token = ?1, refresh_token = ?2, expires_at = ?3, updated_at = ?4
                    WHERE user_id = ?5 AND deleted_at IS NULL
                    "#,
                    params![
                        pair.access_token,
                        pair.refresh_token,
                        pair.expires_at.to_rfc3339(),
                        now,
                        user_id
                    ],
                )
                .context("Failed to store token pair")?;

            if rows == 0 {
                bail!("no credential record for user {}", user_id);
            }
            Ok(())
        })
        .await
    }

    async fn access_token(&self, user_id: i64) -> Result<Option<StoredAccessToken>> {
        self.with_conn(move |conn| {
            let row: Option<(Option<String>, Option<String>)> = conn
                .query_row(
                    "SELECT access_token, expires_at FROM message_api_credentials WHERE user_id = ?1 AND deleted_at IS NULL LIMIT 1",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .context("Failed to query access_token")?;

            match row {
                Some((Some(value), expires_at)) => Ok(Some(StoredAccessToken {
                    value,
                    expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
                })),
                _ => Ok(None),
            }
        })
        .await
    }

    async fn refresh_token(&self, user_id: i64) -> Result<Option<String>> {
        self.query_column("refresh_token", user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::CredentialError;
    use crate::store::bounded;
    use chrono::{Duration, TimeZone};
    use std::time::{Duration as StdDuration, Instant};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 20, 3, 33, 56).unwrap()
    }

    fn in_memory_store() -> SqliteCredentialStore {
        SqliteCredentialStore::new(":memory:", Arc::new(FixedClock::new(now())))
            .expect("in-memory store failed")
    }

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_at: now() + Duration::minutes(15),
        }
    }

    #[tokio::test]
    async fn test_api_key_latest_wins() {
        let store = in_memory_store();
        assert_eq!(store.api_key_hash().await.unwrap(), None);

        store.add_api_key_hash("hash-1").await.unwrap();
        store.add_api_key_hash("hash-2").await.unwrap();
        assert_eq!(store.api_key_hash().await.unwrap().as_deref(), Some("hash-2"));
    }

    #[tokio::test]
    async fn test_registration_round_trip() {
        let store = in_memory_store();
        store
            .save_registration(1, "cid", "secret", &pair("a1", "r1"))
            .await
            .unwrap();

        assert_eq!(store.client_id(1).await.unwrap().as_deref(), Some("cid"));
        assert_eq!(store.client_secret(1).await.unwrap().as_deref(), Some("secret"));
        assert_eq!(store.client_id(2).await.unwrap(), None);

        let access = store.access_token(1).await.unwrap().unwrap();
        assert_eq!(access.value, "a1");
        assert_eq!(access.expires_at, Some(now() + Duration::minutes(15)));
        assert_eq!(store.refresh_token(1).await.unwrap().as_deref(), Some("r1"));

        assert!(store.exists(ValueKind::ClientId, "cid").await.unwrap());
        assert!(!store.exists(ValueKind::ClientId, "secret").await.unwrap());
        assert!(store.exists(ValueKind::AccessToken, "a1").await.unwrap());
        assert!(store.exists(ValueKind::RefreshToken, "r1").await.unwrap());
    }

    #[tokio::test]
    async fn test_token_pair_replaced_in_full() {
        let store = in_memory_store();
        store
            .save_registration(1, "cid", "secret", &pair("a1", "r1"))
            .await
            .unwrap();
        store.save_token_pair(1, &pair("a2", "r2")).await.unwrap();

        assert_eq!(store.access_token(1).await.unwrap().unwrap().value, "a2");
        assert!(!store.exists(ValueKind::AccessToken, "a1").await.unwrap());
        assert!(!store.exists(ValueKind::RefreshToken, "r1").await.unwrap());
        assert_eq!(store.client_id(1).await.unwrap().as_deref(), Some("cid"));
    }

    #[tokio::test]
    async fn test_save_token_pair_without_record_fails() {
        let store = in_memory_store();
        assert!(store.save_token_pair(7, &pair("a", "r")).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_values_rejected() {
        let store = in_memory_store();
        store
            .save_registration(1, "cid", "secret-1", &pair("a1", "r1"))
            .await
            .unwrap();
        store
            .save_registration(2, "cid-2", "secret-2", &pair("a2", "r2"))
            .await
            .unwrap();

        assert!(store
            .save_registration(3, "cid", "secret-3", &pair("a3", "r3"))
            .await
            .is_err());
        assert!(store.save_token_pair(2, &pair("a1", "r-other")).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_reregistration_keeps_previous_row() {
        let store = in_memory_store();
        store
            .save_registration(1, "cid", "secret", &pair("a1", "r1"))
            .await
            .unwrap();
        store
            .save_registration(2, "cid-2", "secret-2", &pair("a2", "r2"))
            .await
            .unwrap();

        // Refresh token collides with user 2's live value
        assert!(store
            .save_registration(1, "cid-new", "secret-new", &pair("a-new", "r2"))
            .await
            .is_err());

        assert_eq!(store.client_id(1).await.unwrap().as_deref(), Some("cid"));
        assert_eq!(store.access_token(1).await.unwrap().unwrap().value, "a1");
        assert_eq!(store.refresh_token(1).await.unwrap().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_reregistration_replaces_everything() {
        let store = in_memory_store();
        store
            .save_registration(1, "cid", "secret", &pair("a1", "r1"))
            .await
            .unwrap();
        store
            .save_registration(1, "cid-new", "secret-new", &pair("a2", "r2"))
            .await
            .unwrap();

        assert_eq!(store.client_id(1).await.unwrap().as_deref(), Some("cid-new"));
        assert_eq!(store.access_token(1).await.unwrap().unwrap().value, "a2");
        assert!(!store.exists(ValueKind::ClientId, "cid").await.unwrap());
    }

    #[tokio::test]
    async fn test_soft_deleted_rows_are_invisible() {
        let store = in_memory_store();
        store
            .save_registration(1, "cid", "secret", &pair("a", "r"))
            .await
            .unwrap();

        assert!(store.soft_delete(1).await.unwrap());
        assert!(!store.soft_delete(1).await.unwrap());

        assert_eq!(store.client_id(1).await.unwrap(), None);
        assert_eq!(store.access_token(1).await.unwrap(), None);
        assert!(!store.exists(ValueKind::AccessToken, "a").await.unwrap());

        // The user can register again after deletion, even with the same values
        store
            .save_registration(1, "cid", "secret", &pair("a", "r"))
            .await
            .unwrap();
        assert_eq!(store.client_id(1).await.unwrap().as_deref(), Some("cid"));
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company.db");
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now()));

        {
            let store = SqliteCredentialStore::new(&path, clock.clone()).unwrap();
            store.add_api_key_hash("hash").await.unwrap();
            store
                .save_registration(5, "cid", "secret", &pair("a", "r"))
                .await
                .unwrap();
        }

        let reopened = SqliteCredentialStore::new(&path, clock).unwrap();
        assert_eq!(reopened.api_key_hash().await.unwrap().as_deref(), Some("hash"));
        assert_eq!(reopened.client_id(5).await.unwrap().as_deref(), Some("cid"));
    }

    #[tokio::test]
    async fn test_locked_database_respects_store_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company.db");
        let store = SqliteCredentialStore::new(&path, Arc::new(FixedClock::new(now()))).unwrap();

        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let started = Instant::now();
        let result = bounded(
            StdDuration::from_millis(100),
            "failed to search client_id",
            store.exists(ValueKind::ClientId, "x"),
        )
        .await;
        let elapsed = started.elapsed();

        blocker.execute_batch("COMMIT").unwrap();

        assert!(elapsed < StdDuration::from_secs(2), "took {:?}", elapsed);
        match result {
            Err(err @ CredentialError::Store { .. }) => {
                assert_eq!(err.message(), "failed to search client_id");
                assert!(err.detail().contains("timed out"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
