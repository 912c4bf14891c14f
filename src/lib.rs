// Tenants and time
pub mod clock;
pub mod tenant;

// Token encryption and key loading
pub mod token;

// Client credential and API key generation
pub mod credentials;

// Errors surfaced by the credential operations
pub mod error;

// Per-tenant persistence
pub mod store;

// Unique value generation
pub mod issuer;

// Register, refresh and verify
pub mod service;

// HTTP API
pub mod api;

// Configuration
pub mod config;

pub use error::CredentialError;
pub use service::{CredentialServices, Registration, ServiceContext};
pub use tenant::Tenant;
pub use token::Principal;
