use anyhow::{Context, Result};
use applift_auth::api::{build_cors_layer, create_router, AppState};
use applift_auth::clock::{Clock, SystemClock};
use applift_auth::config::AuthConfig;
use applift_auth::service::{CredentialServices, ServiceContext};
use applift_auth::store::TenantRegistry;
use applift_auth::token::TokenKeys;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Best-effort .env bootstrap; real environment wins
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "applift_auth=info".into()),
        )
        .init();

    info!("Applift auth starting...");

    let config = AuthConfig::from_env_or_default().context("Failed to load configuration")?;

    let keys = TokenKeys::from_env().context("Token secret keys are required")?;

    info!(
        bind_addr = %config.server.bind_addr,
        company_db = %config.database.company_path,
        student_db = %config.database.student_path,
        access_token_ttl_minutes = config.tokens.access_token_ttl_minutes,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let tenants = TenantRegistry::open_sqlite(&config.database, clock.clone())
        .context("Failed to open tenant credential stores")?;

    let ctx = ServiceContext::new(tenants, &keys, &config.tokens, clock);
    let services = CredentialServices::new(ctx);

    let mut router = create_router(AppState::new(services, config.api.expose_error_detail));
    match &config.server.allowed_origin {
        Some(origin) => {
            router = router.layer(build_cors_layer(origin)?);
            info!(origin = %origin, "CORS enabled");
        }
        None => warn!("No allowed_origin configured; cross-origin requests will be refused"),
    }

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "HTTP API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP API server error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();

    info!("Applift auth stopped");
    Ok(())
}
