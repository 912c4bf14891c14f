//! In-memory credential store for development and tests.

use super::{CredentialStore, StoredAccessToken, TokenPair, ValueKind};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Record {
    client_id: String,
    client_secret: String,
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Record {
    fn values(&self) -> [(ValueKind, &str); 4] {
        [
            (ValueKind::ClientId, self.client_id.as_str()),
            (ValueKind::ClientSecret, self.client_secret.as_str()),
            (ValueKind::AccessToken, self.access_token.as_str()),
            (ValueKind::RefreshToken, self.refresh_token.as_str()),
        ]
    }
}

/// Credential store held entirely in process memory.
///
/// Writes for one user run while holding that user's `records` entry, so
/// concurrent saves for the same user are serialized.
pub struct MemoryCredentialStore {
    /// Primary storage: user_id -> Record
    records: DashMap<i64, Record>,
    /// Secondary index: (kind, value) -> user_id (for uniqueness)
    values: DashMap<(ValueKind, String), i64>,
    /// Append-only API key hashes, newest last
    api_keys: Mutex<Vec<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            values: DashMap::new(),
            api_keys: Mutex::new(Vec::new()),
        }
    }

    /// Store with a single active API key hash.
    pub fn with_api_key_hash(hash: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .api_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(hash.into());
        store
    }

    /// Reserves `value` for `user_id`. Fails if another user holds it.
    fn claim(&self, kind: ValueKind, value: &str, user_id: i64) -> Result<()> {
        match self.values.entry((kind, value.to_string())) {
            Entry::Occupied(owner) if *owner.get() != user_id => {
                bail!("UNIQUE constraint failed: {}", kind.column())
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(user_id);
                Ok(())
            }
        }
    }

    fn release(&self, kind: ValueKind, value: &str, user_id: i64) {
        self.values
            .remove_if(&(kind, value.to_string()), |_, owner| *owner == user_id);
    }

    /// Claims every value in `new`, rolling back on the first conflict.
    fn claim_all(&self, new: &[(ValueKind, &str)], held: &[(ValueKind, &str)], user_id: i64) -> Result<()> {
        for (i, (kind, value)) in new.iter().enumerate() {
            if let Err(e) = self.claim(*kind, value, user_id) {
                for (kind, value) in &new[..i] {
                    if !held.contains(&(*kind, *value)) {
                        self.release(*kind, value, user_id);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Moves the user's index entries from `old` to `new`. Nothing changes
    /// if any new value is held by another user.
    fn swap_values(&self, old: Option<&Record>, new: &Record, user_id: i64) -> Result<()> {
        let old_values = old.map(|r| r.values().to_vec()).unwrap_or_default();
        let new_values = new.values();

        self.claim_all(&new_values, &old_values, user_id)?;
        for (kind, value) in &old_values {
            if !new_values.contains(&(*kind, *value)) {
                self.release(*kind, value, user_id);
            }
        }
        Ok(())
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn api_key_hash(&self) -> Result<Option<String>> {
        let keys = self
            .api_keys
            .lock()
            .map_err(|_| anyhow!("API key list mutex poisoned"))?;
        Ok(keys.last().cloned())
    }

    async fn add_api_key_hash(&self, hash: &str) -> Result<()> {
        self.api_keys
            .lock()
            .map_err(|_| anyhow!("API key list mutex poisoned"))?
            .push(hash.to_string());
        Ok(())
    }

    async fn client_id(&self, user_id: i64) -> Result<Option<String>> {
        Ok(self.records.get(&user_id).map(|r| r.client_id.clone()))
    }

    async fn client_secret(&self, user_id: i64) -> Result<Option<String>> {
        Ok(self.records.get(&user_id).map(|r| r.client_secret.clone()))
    }

    async fn exists(&self, kind: ValueKind, value: &str) -> Result<bool> {
        Ok(self.values.contains_key(&(kind, value.to_string())))
    }

    async fn save_registration(
        &self,
        user_id: i64,
        client_id: &str,
        client_secret: &str,
        pair: &TokenPair,
    ) -> Result<()> {
        let record = Record {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            expires_at: pair.expires_at,
        };

        match self.records.entry(user_id) {
            Entry::Occupied(mut slot) => {
                self.swap_values(Some(slot.get()), &record, user_id)?;
                slot.insert(record);
            }
            Entry::Vacant(slot) => {
                self.swap_values(None, &record, user_id)?;
                slot.insert(record);
            }
        }
        Ok(())
    }

    async fn save_token_pair(&self, user_id: i64, pair: &TokenPair) -> Result<()> {
        let mut slot = self
            .records
            .get_mut(&user_id)
            .ok_or_else(|| anyhow!("no credential record for user {}", user_id))?;

        let record = Record {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            expires_at: pair.expires_at,
            ..slot.value().clone()
        };

        self.swap_values(Some(slot.value()), &record, user_id)?;
        *slot = record;
        Ok(())
    }

    async fn access_token(&self, user_id: i64) -> Result<Option<StoredAccessToken>> {
        Ok(self.records.get(&user_id).map(|r| StoredAccessToken {
            value: r.access_token.clone(),
            expires_at: Some(r.expires_at),
        }))
    }

    async fn refresh_token(&self, user_id: i64) -> Result<Option<String>> {
        Ok(self.records.get(&user_id).map(|r| r.refresh_token.clone()))
    }
}
