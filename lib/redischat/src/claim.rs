//! Single-login claim (`status:{uid}` hash). The gateway's login pipeline
//! (C7 step 4) creates the claim with a placeholder `server_id=unset`; the
//! backend session overwrites it with its real id once VERIFY succeeds
//! (C8). C13 periodically refreshes the TTL on the two authoritative
//! fields while the user stays connected, and removes the claim on
//! disconnect.

use redis::{Connection, Script};

use flux::error::ChatError;
use flux::error::ChatResult;
use flux::{ServerId, UserId};

use crate::keys::status_key;

const UNSET: &str = "unset";

const CLAIM_SCRIPT: &str = r#"
if redis.call("HEXISTS", KEYS[1], "server_id") == 1 then
    return redis.call("HGET", KEYS[1], "server_id")
else
    redis.call("HSET", KEYS[1], "server_id", ARGV[1], "status", "verifyed")
    redis.call("EXPIRE", KEYS[1], ARGV[2])
    return false
end
"#;

/// Attempts to claim `uid` for login. `Ok(None)` means the claim was
/// freshly created (caller may proceed to mint a token); `Ok(Some(prev))`
/// means someone already holds it, where `prev` is `"unset"` if the
/// claimant hasn't completed VERIFY yet, or a parsed backend id otherwise.
pub fn try_claim(conn: &mut Connection, uid: UserId, ttl_secs: u64) -> ChatResult<Option<String>> {
    Script::new(CLAIM_SCRIPT)
        .key(status_key(uid))
        .arg(UNSET)
        .arg(ttl_secs)
        .invoke(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("login claim: {}", e)))
}

/// Overwrites the `server_id` field with the backend's real id once a
/// session completes VERIFY.
pub fn finalize_claim(conn: &mut Connection, uid: UserId, server_id: ServerId) -> ChatResult<()> {
    redis::cmd("HSET")
        .arg(status_key(uid))
        .arg("server_id")
        .arg(server_id)
        .arg("status")
        .arg("verifyed")
        .query::<()>(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("claim finalize: {}", e)))
}

/// Refreshes the TTL on just the authoritative fields
/// (`HEXPIRE status:{uid} ttl FIELDS 2 server_id status`).
pub fn refresh_ttl(conn: &mut Connection, uid: UserId, ttl_secs: u64) -> ChatResult<()> {
    redis::cmd("HEXPIRE")
        .arg(status_key(uid))
        .arg(ttl_secs)
        .arg("FIELDS")
        .arg(2)
        .arg("server_id")
        .arg("status")
        .query::<()>(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("claim refresh: {}", e)))
}

pub fn remove(conn: &mut Connection, uid: UserId) -> ChatResult<()> {
    redis::cmd("DEL")
        .arg(status_key(uid))
        .query::<()>(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("claim remove: {}", e)))
}

/// `HGET status:{uid} server_id`, parsed into a `ServerId`. Returns `None`
/// if the key is absent, or if the claimant hasn't completed VERIFY yet
/// (`server_id == "unset"`) -- in both cases C10's routing decision should
/// treat the user as unreachable and drop the message.
pub fn locate(conn: &mut Connection, uid: UserId) -> ChatResult<Option<ServerId>> {
    let raw: Option<String> = redis::cmd("HGET")
        .arg(status_key(uid))
        .arg("server_id")
        .query(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("claim locate: {}", e)))?;

    Ok(raw.and_then(|v| v.parse::<ServerId>().ok()))
}
