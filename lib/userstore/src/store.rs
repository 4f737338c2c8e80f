//! Relational user store: a contract, not a core subsystem, but something
//! has to sit behind the `C6` pool, so this crate carries a sqlite-backed
//! implementation of the prepared statements a deployment needs.

use std::path::Path;

use flux::error::{ChatError, ChatResult};
use flux::UserId;
use pool::Pool;
use rusqlite::{params, Connection, OptionalExtension};

use crate::passcode;
use crate::snowflake::SnowflakeGen;

/// Verify/register contract the gateway's login pipeline (C7) depends on.
/// Kept as a trait so the reactor-facing code can be written against it
/// without caring whether the backing store is sqlite, postgres, or a
/// mock in tests.
pub trait UserStore: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> ChatResult<UserId>;
    fn register(&self, username: &str, password: &str) -> ChatResult<UserId>;
}

pub struct SqliteUserStore {
    pool: Pool<Connection>,
    ids: SnowflakeGen,
}

impl SqliteUserStore {
    /// Opens (or creates) the sqlite file at `path` and ensures the user
    /// table exists, then builds a pool of up to `max_conns` connections
    /// backed by it. `worker_id` seeds the snowflake generator used for
    /// freshly registered users.
    pub fn open(path: impl AsRef<Path>, max_conns: usize, worker_id: u16) -> ChatResult<SqliteUserStore> {
        let path = path.as_ref().to_owned();

        // Schema creation runs on every freshly opened connection (not just
        // once at startup) so this also works for `:memory:`, where each
        // `Connection::open` is a distinct, schema-less database.
        let open_and_migrate = move || -> ChatResult<Connection> {
            let conn = Connection::open(&path)
                .map_err(|e| ChatError::UpstreamUnavailable(format!("sqlite open: {}", e)))?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS tbl_user (
                    uid INTEGER PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    passcode TEXT NOT NULL
                )",
                [],
            )
            .map_err(|e| ChatError::UpstreamUnavailable(format!("sqlite schema: {}", e)))?;
            Ok(conn)
        };

        // Probe once up front so a broken path/permission fails `open()`
        // immediately rather than on the first `acquire()`.
        open_and_migrate()?;

        let pool = Pool::new(max_conns, open_and_migrate);

        Ok(SqliteUserStore {
            pool,
            ids: SnowflakeGen::new(worker_id),
        })
    }
}

impl UserStore for SqliteUserStore {
    fn verify(&self, username: &str, password: &str) -> ChatResult<UserId> {
        let conn = self.pool.acquire()?;

        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT uid, passcode FROM tbl_user WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| ChatError::UpstreamUnavailable(format!("sqlite query: {}", e)))?;

        match row {
            Some((uid, stored_passcode)) => {
                if passcode::verify_password(password, &stored_passcode) {
                    Ok(uid as u64)
                } else {
                    Err(ChatError::BadCredentials)
                }
            }
            None => Err(ChatError::BadCredentials),
        }
    }

    fn register(&self, username: &str, password: &str) -> ChatResult<UserId> {
        let conn = self.pool.acquire()?;

        let exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tbl_user WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .map_err(|e| ChatError::UpstreamUnavailable(format!("sqlite query: {}", e)))?;

        if exists > 0 {
            return Err(ChatError::AlreadyExists);
        }

        let uid = self.ids.next_id()?;
        let hashed = passcode::hash_password(password);

        conn.execute(
            "INSERT INTO tbl_user(uid, username, passcode) VALUES (?1, ?2, ?3)",
            params![uid as i64, username, hashed],
        )
        .map_err(|e| ChatError::UpstreamUnavailable(format!("sqlite insert: {}", e)))?;

        Ok(uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteUserStore {
        SqliteUserStore::open(":memory:", 4, 1).unwrap()
    }

    #[test]
    fn register_then_verify_succeeds() {
        let store = store();
        let uid = store.register("alice", "hunter2").unwrap();
        assert_eq!(store.verify("alice", "hunter2").unwrap(), uid);
    }

    #[test]
    fn verify_wrong_password_is_bad_credentials() {
        let store = store();
        store.register("alice", "hunter2").unwrap();
        assert_eq!(store.verify("alice", "nope").unwrap_err(), ChatError::BadCredentials);
    }

    #[test]
    fn verify_unknown_user_is_bad_credentials() {
        let store = store();
        assert_eq!(
            store.verify("nobody", "anything").unwrap_err(),
            ChatError::BadCredentials
        );
    }

    #[test]
    fn duplicate_registration_is_already_exists() {
        let store = store();
        store.register("alice", "hunter2").unwrap();
        assert_eq!(
            store.register("alice", "different").unwrap_err(),
            ChatError::AlreadyExists
        );
    }
}
