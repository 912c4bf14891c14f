use tracing::debug;

use super::ServiceContext;
use crate::credentials::constant_time_eq;
use crate::error::CredentialError;
use crate::store::bounded;
use crate::token::Principal;

/// Bearer token verification.
///
/// A token is accepted only if it decrypts under the right key *and* is
/// byte-equal to the value currently stored for its principal. Decryption
/// happens first, so garbage never costs a store lookup.
#[derive(Clone)]
pub struct VerificationService {
    ctx: ServiceContext,
}

impl VerificationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Verifies an access token, including its 15-minute expiry.
    pub async fn verify_access(&self, token: &str) -> Result<Principal, CredentialError> {
        let principal = self.ctx.access_codec.decrypt(token)?;
        let store = self.ctx.tenants.get(principal.tenant)?;

        let stored = bounded(
            self.ctx.store_timeout,
            "failed to get access_token",
            store.access_token(principal.user_id),
        )
        .await?;

        let stored = match stored {
            Some(stored) if constant_time_eq(&stored.value, token) => stored,
            _ => {
                debug!(tenant = %principal.tenant, user_id = principal.user_id, "Access token superseded");
                return Err(CredentialError::InvalidToken);
            }
        };

        match stored.expires_at {
            Some(expires_at) if self.ctx.clock.now() <= expires_at => Ok(principal),
            _ => Err(CredentialError::TokenExpired),
        }
    }

    /// Verifies a refresh token. Refresh tokens never expire; they are only
    /// invalidated by being replaced.
    pub async fn verify_refresh(&self, token: &str) -> Result<Principal, CredentialError> {
        let principal = self.ctx.refresh_codec.decrypt(token)?;
        let store = self.ctx.tenants.get(principal.tenant)?;

        let stored = bounded(
            self.ctx.store_timeout,
            "failed to get refresh_token",
            store.refresh_token(principal.user_id),
        )
        .await?;

        match stored {
            Some(stored) if constant_time_eq(&stored, token) => Ok(principal),
            _ => {
                debug!(tenant = %principal.tenant, user_id = principal.user_id, "Refresh token superseded");
                Err(CredentialError::InvalidToken)
            }
        }
    }
}
