//! `token:{t}` minting and lookup. A token is a 24-byte random
//! value, URL-safe base64 encoded (32 chars), stored as `t -> uid` with a
//! short TTL; a backend looks it up exactly once during the VERIFY
//! handshake.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use redis::{Commands, Connection};

use flux::error::ChatError;
use flux::error::ChatResult;
use flux::UserId;

use crate::keys::token_key;

const TOKEN_BYTES: usize = 24;

/// Generates and stores a fresh token mapping to `uid`, TTL `ttl_secs`.
/// Returns the token string to hand back to the client.
pub fn mint_token(conn: &mut Connection, uid: UserId, ttl_secs: u64) -> ChatResult<String> {
    let mut raw = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    let token = URL_SAFE_NO_PAD.encode(raw);

    let _: () = conn
        .set_ex(token_key(&token), uid, ttl_secs)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("token mint: {}", e)))?;

    Ok(token)
}

/// Looks up a token. The backend's VERIFY handler calls this exactly once
/// per session; the single-use contract is enforced by callers not calling
/// it twice, not by deleting the key here.
pub fn lookup_token(conn: &mut Connection, token: &str) -> ChatResult<Option<UserId>> {
    conn.get(token_key(token))
        .map_err(|e| ChatError::UpstreamUnavailable(format!("token lookup: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_32_url_safe_base64_chars() {
        let mut raw = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = URL_SAFE_NO_PAD.encode(raw);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
