//! Random client credentials, API keys and key material.
//!
//! Everything here draws from the operating system RNG. Client IDs and
//! secrets are URL-safe base64 without padding so they can travel in JSON and
//! query strings untouched.

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
    Engine,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Random bytes behind a client_id (128 bits)
pub const CLIENT_ID_BYTES: usize = 16;

/// Random bytes behind a client_secret (256 bits)
pub const CLIENT_SECRET_BYTES: usize = 32;

/// Random bytes behind a plaintext API key (hex encoded, 64 chars)
pub const API_KEY_BYTES: usize = 32;

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

pub fn generate_client_id() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<CLIENT_ID_BYTES>())
}

pub fn generate_client_secret() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<CLIENT_SECRET_BYTES>())
}

/// A fresh plaintext API key. Only its hash is ever stored.
pub fn generate_api_key() -> String {
    random_bytes::<API_KEY_BYTES>()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// A fresh token secret key, base64 encoded for `ACCESS_TOKEN_SECRET_KEY` /
/// `REFRESH_TOKEN_SECRET_KEY`.
pub fn generate_token_secret_key() -> String {
    BASE64.encode(random_bytes::<32>())
}

/// SHA-256 of the API key, lowercase hex.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Byte comparison whose running time does not depend on where the inputs
/// first differ.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
