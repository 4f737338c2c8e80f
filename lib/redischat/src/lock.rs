//! `tmplock:{name}` optimistic-lock primitive, Lua-scripted so acquire and
//! release are atomic: acquire is a set-if-absent+expire, release is a
//! compare-and-delete so a lock holder never deletes someone else's lock
//! after its own has already expired and been re-acquired.

use rand::RngCore;
use redis::{Connection, Script};

use flux::error::{ChatError, ChatResult};

use crate::keys::tmplock_key;

/// A held lock. Dropping it does *not* release automatically -- callers
/// must explicitly `release` with the same connection they used to
/// `acquire`, since release requires a round-trip the `Drop` impl can't
/// perform without panicking on error.
pub struct LockToken {
    name: String,
    value: String,
}

const ACQUIRE_SCRIPT: &str = r#"
if redis.call("SET", KEYS[1], ARGV[1], "NX", "EX", ARGV[2]) then
    return 1
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Attempts to acquire `tmplock:{name}` for `ttl_secs`. The stored value is
/// `rand64` so only the holder that set it can release it.
pub fn acquire(conn: &mut Connection, name: &str, ttl_secs: u64) -> ChatResult<Option<LockToken>> {
    let key = tmplock_key(name);
    let value = format!("{:x}", rand::thread_rng().next_u64());

    let acquired: i64 = Script::new(ACQUIRE_SCRIPT)
        .key(&key)
        .arg(&value)
        .arg(ttl_secs)
        .invoke(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("tmplock acquire: {}", e)))?;

    if acquired == 1 {
        Ok(Some(LockToken {
            name: name.to_owned(),
            value,
        }))
    } else {
        Ok(None)
    }
}

/// Compare-and-delete release: a no-op if the lock already expired and was
/// re-acquired by someone else.
pub fn release(conn: &mut Connection, token: LockToken) -> ChatResult<()> {
    let key = tmplock_key(&token.name);

    Script::new(RELEASE_SCRIPT)
        .key(&key)
        .arg(&token.value)
        .invoke::<i64>(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("tmplock release: {}", e)))?;

    Ok(())
}
