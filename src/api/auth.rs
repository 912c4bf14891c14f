use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::AppState;
use crate::error::CredentialError;

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, BearerError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(BearerError::Missing)?
        .to_str()
        .map_err(|_| BearerError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

fn parse_bearer_token(header_value: &str) -> Result<String, BearerError> {
    let (scheme, token) = header_value
        .split_once(' ')
        .ok_or(BearerError::InvalidFormat)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(BearerError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(BearerError::Empty);
    }

    Ok(token.to_string())
}

/// Bearer header extraction errors
#[derive(Debug, PartialEq, Clone, Error)]
pub enum BearerError {
    /// Authorization header not present
    #[error("Authorization token not provided")]
    Missing,
    /// Not "Bearer <token>" or not valid header text
    #[error("Invalid authorization token format")]
    InvalidFormat,
    /// Token is empty string
    #[error("Authorization token is empty")]
    Empty,
}

/// Rejects requests without a valid access token.
///
/// On success the verified [`Principal`](crate::token::Principal) is inserted
/// into the request extensions for downstream handlers.
pub async fn require_access_token(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(request.headers()) {
        Ok(token) => token,
        Err(e) => {
            debug!(reason = %e, "Request without usable bearer token");
            return state.reject(&CredentialError::InvalidToken);
        }
    };

    match state.services.verification.verify_access(&token).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => state.reject(&e),
    }
}
