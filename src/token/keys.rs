//! Symmetric keys for the token codecs.
//!
//! Both keys are base64-encoded 32-byte values supplied out of band through
//! the environment. They are read once at startup; a missing or malformed key
//! stops the process before any request is served.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;
use thiserror::Error;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

pub const ACCESS_TOKEN_KEY_VAR: &str = "ACCESS_TOKEN_SECRET_KEY";
pub const REFRESH_TOKEN_KEY_VAR: &str = "REFRESH_TOKEN_SECRET_KEY";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// A validated 256-bit key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Decodes a base64 key and checks it is exactly 32 bytes.
///
/// `var` names the source of the value and only appears in error messages.
pub fn validate_key(var: &'static str, key_base64: &str) -> Result<SecretKey, KeyError> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .map_err(|e| KeyError::Invalid {
            var,
            reason: format!("not valid base64 ({})", e),
        })?;

    let bytes: [u8; KEY_SIZE] = key_bytes.try_into().map_err(|b: Vec<u8>| KeyError::Invalid {
        var,
        reason: format!(
            "key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            b.len()
        ),
    })?;

    Ok(SecretKey(bytes))
}

/// The access-token and refresh-token keys.
#[derive(Debug, Clone)]
pub struct TokenKeys {
    pub access: SecretKey,
    pub refresh: SecretKey,
}

impl TokenKeys {
    /// Reads both keys from the process environment.
    pub fn from_env() -> Result<Self, KeyError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads both keys through `lookup`, treating empty values as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, KeyError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let load = |var: &'static str| -> Result<SecretKey, KeyError> {
            let value = lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(KeyError::Missing(var))?;
            validate_key(var, &value)
        };

        Ok(Self {
            access: load(ACCESS_TOKEN_KEY_VAR)?,
            refresh: load(REFRESH_TOKEN_KEY_VAR)?,
        })
    }
}
