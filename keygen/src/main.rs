//! Provisioning tool for secrets the auth service reads at startup.
//!
//! ```text
//! keygen token-key                    # print a fresh base64 AES-256 key
//! keygen api-key <company|student>    # store a new API key hash, print the key
//! keygen api-key <tenant> <db_path>   # same, against an explicit database
//! keygen revoke <company|student> <user_id> [db_path]
//! ```
//!
//! `revoke` soft-deletes a user's credential row. Its client credentials and
//! tokens stop working; the user can register again.
//!
//! The API key is printed exactly once. Only its SHA-256 hash is stored.

use anyhow::{bail, Context, Result};
use applift_auth::clock::SystemClock;
use applift_auth::config::AuthConfig;
use applift_auth::credentials::{generate_api_key, generate_token_secret_key, hash_api_key};
use applift_auth::store::{CredentialStore, SqliteCredentialStore};
use applift_auth::tenant::Tenant;
use std::sync::Arc;
use tracing::{info, warn};

const USAGE: &str = "usage: keygen token-key | keygen api-key <company|student> [db_path] \
                     | keygen revoke <company|student> <user_id> [db_path]";

#[derive(Debug, PartialEq)]
enum Command {
    TokenKey,
    ApiKey {
        tenant: Tenant,
        db_path: Option<String>,
    },
    Revoke {
        tenant: Tenant,
        user_id: i64,
        db_path: Option<String>,
    },
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args {
        [cmd] if cmd == "token-key" => Ok(Command::TokenKey),
        [cmd, tenant, rest @ ..] if cmd == "api-key" && rest.len() <= 1 => {
            let tenant = tenant
                .parse::<Tenant>()
                .with_context(|| format!("Invalid tenant\n{}", USAGE))?;
            Ok(Command::ApiKey {
                tenant,
                db_path: rest.first().cloned(),
            })
        }
        [cmd, tenant, user_id, rest @ ..] if cmd == "revoke" && rest.len() <= 1 => {
            let tenant = tenant
                .parse::<Tenant>()
                .with_context(|| format!("Invalid tenant\n{}", USAGE))?;
            let user_id = user_id
                .parse::<i64>()
                .with_context(|| format!("Invalid user_id '{}'\n{}", user_id, USAGE))?;
            Ok(Command::Revoke {
                tenant,
                user_id,
                db_path: rest.first().cloned(),
            })
        }
        _ => bail!("{}", USAGE),
    }
}

/// Generates an API key and appends its hash to the tenant's key table.
async fn provision_api_key(tenant: Tenant, db_path: &str) -> Result<String> {
    let store = SqliteCredentialStore::new(db_path, Arc::new(SystemClock))
        .with_context(|| format!("Failed to open {} credential store", tenant))?;

    let api_key = generate_api_key();
    store
        .add_api_key_hash(&hash_api_key(&api_key))
        .await
        .context("Failed to store API key hash")?;

    info!(tenant = %tenant, db_path = %db_path, "API key provisioned");
    Ok(api_key)
}

/// Soft-deletes the user's credential row. Returns whether one was live.
async fn revoke_credentials(tenant: Tenant, user_id: i64, db_path: &str) -> Result<bool> {
    let store = SqliteCredentialStore::new(db_path, Arc::new(SystemClock))
        .with_context(|| format!("Failed to open {} credential store", tenant))?;

    let revoked = store.soft_delete(user_id).await?;
    if revoked {
        info!(tenant = %tenant, user_id, "Credentials revoked");
    } else {
        warn!(tenant = %tenant, user_id, "No live credentials to revoke");
    }
    Ok(revoked)
}

fn resolve_db_path(tenant: Tenant, db_path: Option<String>) -> Result<String> {
    match db_path {
        Some(path) => Ok(path),
        None => {
            let config =
                AuthConfig::from_env_or_default().context("Failed to load configuration")?;
            Ok(config.database.path_for(tenant).to_string())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keygen=info,applift_auth=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match parse_args(&args)? {
        Command::TokenKey => println!("{}", generate_token_secret_key()),
        Command::ApiKey { tenant, db_path } => {
            let db_path = resolve_db_path(tenant, db_path)?;
            println!("{}", provision_api_key(tenant, &db_path).await?);
        }
        Command::Revoke {
            tenant,
            user_id,
            db_path,
        } => {
            let db_path = resolve_db_path(tenant, db_path)?;
            if !revoke_credentials(tenant, user_id, &db_path).await? {
                bail!("No live credentials for {} user {}", tenant, user_id);
            }
        }
    }

    Ok(())
}
