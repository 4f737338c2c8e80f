//! Redis key/stream helpers: the typed KV + hash + stream substrate the rest
//! of the workspace treats Redis as. Every fallible call returns
//! `ChatResult` so callers never see a raw `redis::RedisError`.

pub mod claim;
pub mod keys;
pub mod lock;
pub mod serverlist;
pub mod streams;
pub mod token;
pub mod userinfo;

pub use lock::LockToken;
pub use streams::{StreamEntry, StreamKind};

use flux::error::ChatError;
use redis::Client;

/// Opens a synchronous connection pool factory bound to `redis_url`. The
/// returned closure is handed to `pool::Pool::new` by each service.
pub fn connection_factory(redis_url: &str) -> flux::error::ChatResult<impl Fn() -> flux::error::ChatResult<redis::Connection> + Send + Sync + Clone> {
    let client = Client::open(redis_url).map_err(|e| ChatError::UpstreamUnavailable(format!("redis client: {}", e)))?;

    Ok(move || {
        client
            .get_connection()
            .map_err(|e| ChatError::UpstreamUnavailable(format!("redis connect: {}", e)))
    })
}
