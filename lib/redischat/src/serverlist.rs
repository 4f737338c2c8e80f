//! Mirrors the in-memory load-balancer snapshot (C3) into the `server_list`
//! Redis hash (C5), and reads it back for the supplemented `/rpc/dump`
//! debug route.

use redis::Connection;

use flux::error::ChatError;
use flux::error::ChatResult;
use loadindex::ServerInfo;

use crate::keys::server_list_key;

const SERVER_LIST_TTL_SECS: u64 = 40;

/// One field per server, JSON-encoded `ServerInfo`-shaped tuple
/// `addr,load,last_ts` (kept dependency-light rather than pulling serde
/// into this crate just for one value shape).
pub fn mirror(conn: &mut Connection, servers: &[ServerInfo]) -> ChatResult<()> {
    let key = server_list_key();

    redis::cmd("DEL")
        .arg(key)
        .query::<()>(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("server_list del: {}", e)))?;

    if !servers.is_empty() {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for s in servers {
            cmd.arg(s.id).arg(format!("{},{},{}", s.addr, s.load, s.last_ts));
        }
        cmd.query::<()>(conn)
            .map_err(|e| ChatError::UpstreamUnavailable(format!("server_list hset: {}", e)))?;
    }

    redis::cmd("EXPIRE")
        .arg(key)
        .arg(SERVER_LIST_TTL_SECS)
        .query::<()>(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("server_list expire: {}", e)))
}
