//! AES-256-GCM bearer token codec.
//!
//! A token is `base64(nonce || ciphertext)` where the plaintext is
//!
//! ```text
//! appkind:<tenant>|user_id:<id>|random:<filler>
//! ```
//!
//! The filler is a fresh alphanumeric string (16 chars for access tokens,
//! 32 for refresh tokens), so two tokens minted for the same principal never
//! share a plaintext. Each codec holds its own key; an access token never
//! decrypts under the refresh codec and vice versa.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::tenant::Tenant;

pub mod keys;

pub use keys::{KeyError, SecretKey, TokenKeys};

#[cfg(test)]
mod tests;

/// Size of the nonce in bytes (96 bits, standard for GCM)
pub const NONCE_SIZE: usize = 12;

const APPKIND_PREFIX: &str = "appkind:";
const USER_ID_PREFIX: &str = "user_id:";
const RANDOM_PREFIX: &str = "random:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Length of the random filler mixed into the payload.
    pub fn filler_len(&self) -> usize {
        match self {
            TokenKind::Access => 16,
            TokenKind::Refresh => 32,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tenant and user a verified token speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "app_kind")]
    pub tenant: Tenant,
    pub user_id: i64,
}

/// Codec failures.
///
/// The variants stay distinct for logging and tests, but every one of them is
/// reported to callers with the same generic `invalid_token` response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("failed to encrypt {kind}: {reason}")]
    EncryptionFailure { kind: TokenKind, reason: String },

    #[error("{kind} is not a well-formed token")]
    MalformedToken { kind: TokenKind },

    #[error("{kind} failed authentication")]
    AuthenticationFailure { kind: TokenKind },

    #[error("invalid {kind} format: {reason}")]
    InvalidTokenFormat { kind: TokenKind, reason: &'static str },
}

/// Encrypts and decrypts one kind of token under one key.
#[derive(Clone)]
pub struct TokenCodec {
    kind: TokenKind,
    cipher: Aes256Gcm,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").field("kind", &self.kind).finish()
    }
}

impl TokenCodec {
    pub fn new(kind: TokenKind, key: &SecretKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        Self {
            kind,
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Mints an opaque token for `(tenant, user_id)`.
    pub fn encrypt(&self, tenant: Tenant, user_id: i64) -> Result<String, TokenError> {
        let payload = format!(
            "{}{}|{}{}|{}{}",
            APPKIND_PREFIX,
            tenant,
            USER_ID_PREFIX,
            user_id,
            RANDOM_PREFIX,
            random_filler(self.kind.filler_len())
        );

        // Generate random nonce (never reuse!)
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, payload.as_bytes())
            .map_err(|e| TokenError::EncryptionFailure {
                kind: self.kind,
                reason: e.to_string(),
            })?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Opens a token and recovers the principal it was minted for.
    pub fn decrypt(&self, token: &str) -> Result<Principal, TokenError> {
        let malformed = TokenError::MalformedToken { kind: self.kind };

        let decoded = BASE64.decode(token).map_err(|_| malformed.clone())?;
        if decoded.len() < NONCE_SIZE {
            return Err(malformed);
        }

        let (nonce, ciphertext) = decoded.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TokenError::AuthenticationFailure { kind: self.kind })?;

        self.parse_payload(&plaintext)
    }

    fn parse_payload(&self, plaintext: &[u8]) -> Result<Principal, TokenError> {
        let invalid = |reason| TokenError::InvalidTokenFormat {
            kind: self.kind,
            reason,
        };

        let payload = std::str::from_utf8(plaintext).map_err(|_| invalid("payload is not UTF-8"))?;

        let parts: Vec<&str> = payload.split('|').collect();
        if parts.len() != 3 {
            return Err(invalid("expected 3 fields"));
        }

        let tenant = parts[0]
            .strip_prefix(APPKIND_PREFIX)
            .ok_or_else(|| invalid("appkind not found"))?
            .parse::<Tenant>()
            .map_err(|_| invalid("unknown appkind"))?;

        let user_id = parts[1]
            .strip_prefix(USER_ID_PREFIX)
            .ok_or_else(|| invalid("user_id not found"))?
            .parse::<i64>()
            .map_err(|_| invalid("user_id is not an integer"))?;

        Ok(Principal { tenant, user_id })
    }
}

fn random_filler(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
