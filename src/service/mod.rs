//! The four outward credential operations.
//!
//! ```text
//! register ──► client_id / client_secret + first token pair
//!                  │
//! refresh  ◄───────┘  (client credentials) ──► rotated token pair
//!                  │
//! verify_access / verify_refresh ◄── bearer token ──► Principal
//! ```
//!
//! All services share one [`ServiceContext`]: the tenant registry, the value
//! issuer, the clock and the per-call store timeout. Nothing here holds
//! mutable state between requests; the stores are the only source of truth.

use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::issuer::UniqueValueIssuer;
use crate::store::TenantRegistry;
use crate::token::{TokenCodec, TokenKeys, TokenKind};

mod refresh;
mod register;
mod verify;

pub use refresh::RefreshService;
pub use register::{Registration, RegistrationService};
pub use verify::VerificationService;


/// Dependencies shared by every service.
#[derive(Clone)]
pub struct ServiceContext {
    pub tenants: Arc<TenantRegistry>,
    pub issuer: Arc<UniqueValueIssuer>,
    pub access_codec: TokenCodec,
    pub refresh_codec: TokenCodec,
    pub clock: Arc<dyn Clock>,
    pub store_timeout: StdDuration,
}

impl ServiceContext {
    pub fn new(
        tenants: TenantRegistry,
        keys: &TokenKeys,
        config: &TokenConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let access_codec = TokenCodec::new(TokenKind::Access, &keys.access);
        let refresh_codec = TokenCodec::new(TokenKind::Refresh, &keys.refresh);
        let store_timeout = StdDuration::from_millis(config.store_timeout_ms);
        let issuer = UniqueValueIssuer::new(
            access_codec.clone(),
            refresh_codec.clone(),
            Duration::minutes(config.access_token_ttl_minutes),
            store_timeout,
        );

        Self {
            tenants: Arc::new(tenants),
            issuer: Arc::new(issuer),
            access_codec,
            refresh_codec,
            clock,
            store_timeout,
        }
    }
}

/// Every credential operation, wired from one context.
#[derive(Clone)]
pub struct CredentialServices {
    pub registration: RegistrationService,
    pub refresh: RefreshService,
    pub verification: VerificationService,
}

impl CredentialServices {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            registration: RegistrationService::new(ctx.clone()),
            refresh: RefreshService::new(ctx.clone()),
            verification: VerificationService::new(ctx),
        }
    }
}
