use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ServiceContext;
use crate::credentials::{constant_time_eq, hash_api_key};
use crate::error::CredentialError;
use crate::store::{bounded, TokenPair, ValueKind};
use crate::tenant::Tenant;
use crate::token::Principal;

/// Everything a successful registration hands back to the caller.
///
/// The client secret is only ever returned here; afterwards it lives solely
/// in the tenant's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub client_id: String,
    pub client_secret: String,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// API-key-gated client registration.
#[derive(Clone)]
pub struct RegistrationService {
    ctx: ServiceContext,
}

impl RegistrationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Registers `user_id` in `tenant` after checking the shared API key.
    ///
    /// # Flow
    /// 1. Compare SHA-256(`api_key`) with the tenant's stored hash
    /// 2. Issue a unique client_id, client_secret and access/refresh pair
    /// 3. Store all four with a fresh expiry in one write
    ///
    /// Registering an already registered user replaces its client
    /// credentials and token pair. If anything fails before the write, the
    /// previous registration stays usable.
    pub async fn register(
        &self,
        tenant: Tenant,
        user_id: i64,
        api_key: &str,
    ) -> Result<Registration, CredentialError> {
        let store = self.ctx.tenants.get(tenant)?;
        let timeout = self.ctx.store_timeout;

        let stored_hash = bounded(timeout, "failed to get API Key", store.api_key_hash())
            .await?
            .ok_or_else(|| {
                CredentialError::store(
                    "failed to get API Key",
                    anyhow!("no API key provisioned for {}", tenant),
                )
            })?;

        if !constant_time_eq(&hash_api_key(api_key), &stored_hash) {
            warn!(tenant = %tenant, user_id, "Registration rejected: API key mismatch");
            return Err(CredentialError::InvalidApiKey);
        }

        let subject = Principal { tenant, user_id };
        let issuer = &self.ctx.issuer;

        let client_id = issuer
            .issue(store.as_ref(), ValueKind::ClientId, subject)
            .await?;
        let client_secret = issuer
            .issue(store.as_ref(), ValueKind::ClientSecret, subject)
            .await?;
        let tokens = issuer
            .issue_token_pair(store.as_ref(), subject, self.ctx.clock.now())
            .await?;

        bounded(
            timeout,
            "failed to insert message api client_id and client_secret",
            store.save_registration(user_id, &client_id, &client_secret, &tokens),
        )
        .await?;

        info!(
            tenant = %tenant,
            user_id,
            expires_at = %tokens.expires_at,
            "Client registered"
        );

        Ok(Registration {
            client_id,
            client_secret,
            tokens,
        })
    }
}
