//! Bearer-credential session gate.
//!
//! Credentials are opaque: a fixed `agt_` prefix followed by 32 lowercase hex
//! characters (16 random bytes). The prefix/length/charset check lets malformed
//! tokens be rejected before any directory lookup; beyond that the server never
//! parses a credential for meaning.

use axum::http::{header, HeaderMap};
use rand::Rng;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::Agent;

pub const CREDENTIAL_PREFIX: &str = "agt_";
const CREDENTIAL_HEX_LEN: usize = 32;
pub const CREDENTIAL_LEN: usize = CREDENTIAL_PREFIX.len() + CREDENTIAL_HEX_LEN;

/// Mint a fresh credential from 128 bits of randomness.
///
/// Uniqueness is enforced by the directory on top of this; collisions are
/// cryptographically negligible but still checked there.
pub fn mint_credential() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    format!("{}{}", CREDENTIAL_PREFIX, hex::encode(bytes))
}

/// Cheap shape check: wrong prefix, length, or charset means the token cannot
/// be one of ours and is rejected without touching the directory.
pub fn looks_like_credential(token: &str) -> bool {
    token.len() == CREDENTIAL_LEN
        && token.starts_with(CREDENTIAL_PREFIX)
        && token[CREDENTIAL_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// Extract the token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the calling agent or fail with 401.
///
/// Authentication is also a liveness signal: the directory marks the agent
/// online and refreshes its last-activity timestamp on success.
pub async fn require_agent(state: &Arc<AppState>, headers: &HeaderMap) -> Result<Agent, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;

    if !looks_like_credential(token) {
        return Err(ApiError::Unauthorized);
    }

    state.directory.authenticate(token).await
}
