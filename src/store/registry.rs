use super::{CredentialStore, SqliteCredentialStore};
use crate::clock::Clock;
use crate::config::DatabaseConfig;
use crate::error::CredentialError;
use crate::tenant::Tenant;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Per-tenant credential stores, resolved once at startup and shared by
/// reference with every service.
#[derive(Clone, Default)]
pub struct TenantRegistry {
    stores: HashMap<Tenant, Arc<dyn CredentialStore>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, tenant: Tenant, store: Arc<dyn CredentialStore>) -> Self {
        self.stores.insert(tenant, store);
        self
    }

    /// Opens one SQLite database per tenant as named in `config`.
    pub fn open_sqlite(config: &DatabaseConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut registry = Self::new();
        for tenant in Tenant::ALL {
            let path = config.path_for(tenant);
            let store = SqliteCredentialStore::new(path, clock.clone())
                .with_context(|| format!("Failed to open {} credential store", tenant))?;
            info!(tenant = %tenant, path = %path, "Credential store opened");
            registry = registry.with_store(tenant, Arc::new(store));
        }
        Ok(registry)
    }

    pub fn get(&self, tenant: Tenant) -> Result<&Arc<dyn CredentialStore>, CredentialError> {
        self.stores
            .get(&tenant)
            .ok_or_else(|| CredentialError::UnknownTenant(tenant.to_string()))
    }
}
