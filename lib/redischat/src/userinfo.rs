//! Best-effort `userinfo:{uid}` cache refresh (C7 step 3). Failures here
//! are logged and swallowed by the caller -- they must never fail a login.

use redis::Connection;

use flux::error::ChatError;
use flux::error::ChatResult;
use flux::UserId;

use crate::keys::userinfo_key;

const USERINFO_TTL_SECS: u64 = 3600;

pub fn refresh(conn: &mut Connection, uid: UserId, username: &str) -> ChatResult<()> {
    redis::cmd("HSET")
        .arg(userinfo_key(uid))
        .arg("username")
        .arg(username)
        .query::<()>(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("userinfo hset: {}", e)))?;

    redis::cmd("EXPIRE")
        .arg(userinfo_key(uid))
        .arg(USERINFO_TTL_SECS)
        .query::<()>(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("userinfo expire: {}", e)))
}
