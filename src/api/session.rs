//! Opaque session keys handed out at login.
//!
//! The client sends the key back in the `X-Session-Key` header. Only a
//! sha-256 digest of the key is stored, so a leaked sessions table can't
//! be replayed.

use crate::api::{
    error::AuthError,
    storage::{self, AuthUser},
};
use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

pub const SESSION_HEADER: &str = "x-session-key";

const SESSION_KEY_BYTES: usize = 32;

/// Fresh random session key, URL-safe so it survives headers and logs.
#[must_use]
pub fn generate_session_key() -> String {
    let mut bytes = [0u8; SESSION_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest stored at rest instead of the key itself.
#[must_use]
pub fn hash_session_key(key: &str) -> Vec<u8> {
    Sha256::digest(key.as_bytes()).to_vec()
}

/// Pull the session key out of the request headers, if any.
#[must_use]
pub fn session_key_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Resolve the request's session into a user, or `None` for anonymous
/// callers and stale keys alike.
pub async fn authenticate(pool: &PgPool, headers: &HeaderMap) -> Result<Option<AuthUser>, AuthError> {
    let Some(key) = session_key_from_headers(headers) else {
        return Ok(None);
    };

    let user = storage::lookup_session(pool, &hash_session_key(key)).await?;

    Ok(user)
}

/// Like [`authenticate`], but anonymous callers get a 403.
pub async fn require_auth(pool: &PgPool, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
    authenticate(pool, headers)
        .await?
        .ok_or_else(AuthError::authorization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn keys_are_unique_and_url_safe() {
        let a = generate_session_key();
        let b = generate_session_key();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        // 32 bytes base64url without padding
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn hash_is_stable_and_32_bytes() {
        let key = "abc";
        assert_eq!(hash_session_key(key), hash_session_key(key));
        assert_eq!(hash_session_key(key).len(), 32);
        assert_ne!(hash_session_key("abc"), hash_session_key("abd"));
    }

    #[test]
    fn header_extraction() {
        let mut headers = HeaderMap::new();
        assert!(session_key_from_headers(&headers).is_none());

        headers.insert(SESSION_HEADER, HeaderValue::from_static(""));
        assert!(session_key_from_headers(&headers).is_none());

        headers.insert(SESSION_HEADER, HeaderValue::from_static("sekret"));
        assert_eq!(session_key_from_headers(&headers), Some("sekret"));
    }
}
