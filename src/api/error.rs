use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{CredentialError, Severity};

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub fn status_for(severity: Severity) -> StatusCode {
    match severity {
        Severity::Unauthorized => StatusCode::UNAUTHORIZED,
        Severity::BadRequest => StatusCode::BAD_REQUEST,
        Severity::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Builds an error response. `detail` is only sent when `expose_detail` is
/// set.
pub fn error_response(
    status: StatusCode,
    message: String,
    detail: String,
    expose_detail: bool,
) -> Response {
    let detail = (expose_detail && !detail.is_empty()).then_some(detail);
    (status, Json(ErrorBody { message, detail })).into_response()
}

/// Logs `err` with its full detail and converts it into a response.
pub fn credential_error_response(err: &CredentialError, expose_detail: bool) -> Response {
    let severity = err.severity();
    let detail = err.detail();

    match severity {
        Severity::Internal => error!(error = %err, detail = %detail, "Credential operation failed"),
        _ => debug!(error = %err, detail = %detail, "Credential request rejected"),
    }

    error_response(status_for(severity), err.message(), detail, expose_detail)
}
