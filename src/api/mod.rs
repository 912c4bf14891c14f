//! HTTP surface for the credential operations.
//!
//! | Route | Auth | Result |
//! |---|---|---|
//! | `POST /messages/register` | API key in body | client credentials + first token pair |
//! | `POST /messages/token` | refresh token + client credentials in body | rotated token pair |
//! | `GET /messages/me` | `Authorization: Bearer <access_token>` | the caller's principal |
//!
//! Message routes mounted by the host application wrap themselves with
//! [`require_access_token`] and read the [`Principal`] from request
//! extensions.

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::error::CredentialError;
use crate::service::CredentialServices;
use crate::store::TokenPair;
use crate::tenant::Tenant;
use crate::token::Principal;

mod auth;
mod error;

pub use auth::{extract_bearer_token, require_access_token, BearerError};
pub use error::{credential_error_response, error_response, status_for, ErrorBody};

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub services: CredentialServices,
    /// Include diagnostic `detail` in error bodies
    pub expose_error_detail: bool,
}

impl AppState {
    pub fn new(services: CredentialServices, expose_error_detail: bool) -> Self {
        Self {
            services,
            expose_error_detail,
        }
    }

    pub(crate) fn reject(&self, err: &CredentialError) -> Response {
        credential_error_response(err, self.expose_error_detail)
    }

    fn bad_body(&self, rejection: JsonRejection) -> Response {
        debug!(error = %rejection, "Malformed request body");
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid request body".to_string(),
            rejection.body_text(),
            self.expose_error_detail,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub api_key: String,
    pub user_id: i64,
    pub app_kind: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
}

pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let protected = Router::new()
        .route("/messages/me", get(current_principal))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_access_token,
        ));

    Router::new()
        .route("/messages/register", post(register))
        .route("/messages/token", post(token))
        .merge(protected)
        .with_state(state)
}

/// CORS for a single allowed origin.
pub fn build_cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin: HeaderValue = origin
        .parse()
        .with_context(|| format!("Invalid CORS origin '{}'", origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]))
}

/// POST /messages/register
async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return state.bad_body(rejection),
    };

    let tenant: Tenant = match request.app_kind.parse() {
        Ok(tenant) => tenant,
        Err(e) => return state.reject(&CredentialError::UnknownTenant(e.0)),
    };

    match state
        .services
        .registration
        .register(tenant, request.user_id, &request.api_key)
        .await
    {
        Ok(registration) => Json(registration).into_response(),
        Err(e) => state.reject(&e),
    }
}

/// POST /messages/token
async fn token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return state.bad_body(rejection),
    };

    match rotate(&state.services, &request).await {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => state.reject(&e),
    }
}

/// The refresh token names the principal; the client credentials authorize
/// the rotation.
async fn rotate(
    services: &CredentialServices,
    request: &TokenRequest,
) -> Result<TokenPair, CredentialError> {
    let principal = services
        .verification
        .verify_refresh(&request.refresh_token)
        .await?;

    services
        .refresh
        .refresh(
            principal.tenant,
            principal.user_id,
            &request.client_id,
            &request.client_secret,
        )
        .await
}

/// GET /messages/me
async fn current_principal(Extension(principal): Extension<Principal>) -> Json<Principal> {
    Json(principal)
}
