//! Error taxonomy shared by every credential operation.
//!
//! Each error knows its [`Severity`] plus a caller-safe `message` and a
//! `detail` meant for logs. The HTTP layer maps severity onto a status code
//! and decides whether `detail` leaves the process.

use thiserror::Error;

use crate::store::ValueKind;
use crate::token::TokenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The caller presented bad credentials. Safe to report generically.
    Unauthorized,
    /// The request named something that does not exist (e.g. a tenant).
    BadRequest,
    /// Our fault. The caller sees a generic message.
    Internal,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API key is invalid")]
    InvalidApiKey,

    #[error("client_id is invalid")]
    InvalidClientId,

    #[error("client_secret is invalid")]
    InvalidClientSecret,

    #[error("token does not match the stored token")]
    InvalidToken,

    #[error("access token has expired")]
    TokenExpired,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("unknown app kind '{0}'")]
    UnknownTenant(String),

    #[error("failed to generate a unique {kind} after {attempts} attempts")]
    ExhaustedRetries { kind: ValueKind, attempts: usize },

    #[error("{context}: {source:#}")]
    Store {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl CredentialError {
    pub fn store(context: &'static str, source: anyhow::Error) -> Self {
        CredentialError::Store { context, source }
    }

    pub fn severity(&self) -> Severity {
        match self {
            CredentialError::InvalidApiKey
            | CredentialError::InvalidClientId
            | CredentialError::InvalidClientSecret
            | CredentialError::InvalidToken
            | CredentialError::TokenExpired
            | CredentialError::Token(_) => Severity::Unauthorized,
            CredentialError::UnknownTenant(_) => Severity::BadRequest,
            CredentialError::ExhaustedRetries { .. } | CredentialError::Store { .. } => {
                Severity::Internal
            }
        }
    }

    /// Short message that is always safe to show the caller.
    pub fn message(&self) -> String {
        match self {
            CredentialError::InvalidApiKey => "API Key is invalid".to_string(),
            CredentialError::InvalidClientId => "client_id is invalid".to_string(),
            CredentialError::InvalidClientSecret => "client_secret is invalid".to_string(),
            CredentialError::InvalidToken | CredentialError::Token(_) => {
                "invalid_token".to_string()
            }
            CredentialError::TokenExpired => "token_expired".to_string(),
            CredentialError::UnknownTenant(_) => "unknown app_kind".to_string(),
            CredentialError::ExhaustedRetries { kind, attempts } => {
                format!("failed to generate {} {} times", kind, attempts)
            }
            CredentialError::Store { context, .. } => context.to_string(),
        }
    }

    /// Diagnostic text for logs. Every codec failure and a superseded token
    /// produce the same detail.
    pub fn detail(&self) -> String {
        match self {
            CredentialError::InvalidToken | CredentialError::Token(_) => {
                "invalid token".to_string()
            }
            CredentialError::TokenExpired => "The access token has expired".to_string(),
            CredentialError::UnknownTenant(kind) => format!("unknown app kind '{}'", kind),
            CredentialError::Store { source, .. } => format!("{:#}", source),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;
    use anyhow::anyhow;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(CredentialError::InvalidApiKey.severity(), Severity::Unauthorized);
        assert_eq!(CredentialError::TokenExpired.severity(), Severity::Unauthorized);
        assert_eq!(
            CredentialError::UnknownTenant("common".into()).severity(),
            Severity::BadRequest
        );
        assert_eq!(
            CredentialError::ExhaustedRetries {
                kind: ValueKind::ClientId,
                attempts: 5
            }
            .severity(),
            Severity::Internal
        );
        assert_eq!(
            CredentialError::store("failed to get client_id", anyhow!("disk I/O error")).severity(),
            Severity::Internal
        );
    }

    #[test]
    fn test_codec_failures_are_indistinguishable() {
        let tampered = CredentialError::from(TokenError::AuthenticationFailure {
            kind: TokenKind::Access,
        });
        let garbled = CredentialError::from(TokenError::MalformedToken {
            kind: TokenKind::Access,
        });
        let superseded = CredentialError::InvalidToken;

        for err in [&garbled, &superseded] {
            assert_eq!(err.message(), tampered.message());
            assert_eq!(err.detail(), tampered.detail());
        }
    }

    #[test]
    fn test_store_error_keeps_raw_text_out_of_message() {
        let err = CredentialError::store(
            "failed to get API key",
            anyhow!("no such table: message_api_keys"),
        );
        assert_eq!(err.message(), "failed to get API key");
        assert!(err.detail().contains("no such table"));
    }

    #[test]
    fn test_exhausted_message_names_kind() {
        let err = CredentialError::ExhaustedRetries {
            kind: ValueKind::RefreshToken,
            attempts: 5,
        };
        assert_eq!(err.message(), "failed to generate refresh_token 5 times");
    }
}
