//! Generation of random values that must not collide with stored ones.
//!
//! Every candidate carries 128 bits of entropy or more, so a collision is not
//! expected in practice. The loop still bounds itself at
//! [`MAX_ISSUE_ATTEMPTS`] and reports [`CredentialError::ExhaustedRetries`]
//! rather than spinning.

use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use crate::credentials::{generate_client_id, generate_client_secret};
use crate::error::CredentialError;
use crate::store::{bounded, CredentialStore, TokenPair, ValueKind};
use crate::token::{Principal, TokenCodec};

/// Attempts made before giving up on a unique value
pub const MAX_ISSUE_ATTEMPTS: usize = 5;

pub struct UniqueValueIssuer {
    access: TokenCodec,
    refresh: TokenCodec,
    access_ttl: Duration,
    store_timeout: StdDuration,
}

impl UniqueValueIssuer {
    pub fn new(
        access: TokenCodec,
        refresh: TokenCodec,
        access_ttl: Duration,
        store_timeout: StdDuration,
    ) -> Self {
        Self {
            access,
            refresh,
            access_ttl,
            store_timeout,
        }
    }

    fn candidate(&self, kind: ValueKind, subject: Principal) -> Result<String, CredentialError> {
        let value = match kind {
            ValueKind::ClientId => generate_client_id(),
            ValueKind::ClientSecret => generate_client_secret(),
            ValueKind::AccessToken => self.access.encrypt(subject.tenant, subject.user_id)?,
            ValueKind::RefreshToken => self.refresh.encrypt(subject.tenant, subject.user_id)?,
        };
        Ok(value)
    }

    /// Produces a `kind` value that `store` does not already hold.
    pub async fn issue(
        &self,
        store: &dyn CredentialStore,
        kind: ValueKind,
        subject: Principal,
    ) -> Result<String, CredentialError> {
        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let candidate = self.candidate(kind, subject)?;

            let taken = bounded(
                self.store_timeout,
                search_context(kind),
                store.exists(kind, &candidate),
            )
            .await?;

            if !taken {
                return Ok(candidate);
            }
            debug!(kind = %kind, attempt, "Generated value already in use, retrying");
        }

        warn!(
            kind = %kind,
            tenant = %subject.tenant,
            user_id = subject.user_id,
            attempts = MAX_ISSUE_ATTEMPTS,
            "Could not generate a unique value"
        );
        Err(CredentialError::ExhaustedRetries {
            kind,
            attempts: MAX_ISSUE_ATTEMPTS,
        })
    }

    /// Issues a unique access token and a unique refresh token for `subject`.
    ///
    /// The access token expires `access_ttl` after `now`.
    pub async fn issue_token_pair(
        &self,
        store: &dyn CredentialStore,
        subject: Principal,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, CredentialError> {
        let access_token = self.issue(store, ValueKind::AccessToken, subject).await?;
        let refresh_token = self.issue(store, ValueKind::RefreshToken, subject).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_at: now + self.access_ttl,
        })
    }
}

fn search_context(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::ClientId => "failed to search client_id",
        ValueKind::ClientSecret => "failed to search client_secret",
        ValueKind::AccessToken => "failed to search access_token",
        ValueKind::RefreshToken => "failed to search refresh_token",
    }
}
