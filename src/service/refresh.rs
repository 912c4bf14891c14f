use tracing::{debug, info};

use super::ServiceContext;
use crate::credentials::constant_time_eq;
use crate::error::CredentialError;
use crate::store::{bounded, TokenPair};
use crate::tenant::Tenant;
use crate::token::Principal;

/// Client-credential-gated token rotation.
#[derive(Clone)]
pub struct RefreshService {
    ctx: ServiceContext,
}

impl RefreshService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Checks the presented client credentials and rotates the user's
    /// access and refresh tokens.
    ///
    /// The previous pair stops verifying as soon as the new one is stored,
    /// even if the old access token has not expired yet. On a credential
    /// mismatch nothing is issued or written.
    pub async fn refresh(
        &self,
        tenant: Tenant,
        user_id: i64,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenPair, CredentialError> {
        let store = self.ctx.tenants.get(tenant)?;
        let timeout = self.ctx.store_timeout;

        let stored_id = bounded(timeout, "failed to get client_id", store.client_id(user_id)).await?;
        if !matches!(stored_id, Some(ref id) if constant_time_eq(id, client_id)) {
            debug!(tenant = %tenant, user_id, "Refresh rejected: client_id mismatch");
            return Err(CredentialError::InvalidClientId);
        }

        let stored_secret = bounded(
            timeout,
            "failed to get client_secret",
            store.client_secret(user_id),
        )
        .await?;
        if !matches!(stored_secret, Some(ref secret) if constant_time_eq(secret, client_secret)) {
            debug!(tenant = %tenant, user_id, "Refresh rejected: client_secret mismatch");
            return Err(CredentialError::InvalidClientSecret);
        }

        let subject = Principal { tenant, user_id };
        let tokens = self
            .ctx
            .issuer
            .issue_token_pair(store.as_ref(), subject, self.ctx.clock.now())
            .await?;

        bounded(
            timeout,
            "failed to save token",
            store.save_token_pair(user_id, &tokens),
        )
        .await?;

        info!(tenant = %tenant, user_id, expires_at = %tokens.expires_at, "Tokens rotated");

        Ok(tokens)
    }
}
