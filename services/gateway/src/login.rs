//! Gateway login pipeline (C7): verify credentials, pick a backend, refresh
//! the userinfo cache, claim the single-login slot, mint a token, and
//! return the session handoff the client needs -- in that order.

use std::sync::Arc;

use pool::Pool;
use redis::Connection;

use flux::error::{ChatError, ChatResult};
use flux::logging;
use flux::UserId;
use statusclient::StatusClient;
use userstore::UserStore;

pub struct LoginResponse {
    pub token: String,
    pub server_addr: String,
    pub uid: UserId,
}

pub struct LoginPipeline {
    users: Arc<dyn UserStore>,
    status: StatusClient,
    redis_pool: Pool<Connection>,
    login_claim_ttl_secs: u64,
    token_ttl_secs: u64,
    log: logging::Logger,
}

impl LoginPipeline {
    pub fn new(
        users: Arc<dyn UserStore>,
        status: StatusClient,
        redis_pool: Pool<Connection>,
        login_claim_ttl_secs: u64,
        token_ttl_secs: u64,
        log: logging::Logger,
    ) -> LoginPipeline {
        LoginPipeline {
            users,
            status,
            redis_pool,
            login_claim_ttl_secs,
            token_ttl_secs,
            log,
        }
    }

    pub fn login(&self, username: &str, password: &str) -> ChatResult<LoginResponse> {
        // Step 1: verify credentials.
        let uid = self.users.verify(username, password)?;

        // Step 2: pick a backend.
        let (server_id, server_addr) = self
            .status
            .check_minimal_load_server()
            .map_err(|e| ChatError::UpstreamUnavailable(format!("status unavailable: {}", e)))?
            .ok_or_else(|| ChatError::UpstreamUnavailable("no backend available".to_owned()))?;

        let mut conn = self.redis_pool.acquire()?;

        // Step 3: best-effort userinfo cache refresh. Never fails the login.
        if let Err(e) = redischat::userinfo::refresh(&mut conn, uid, username) {
            logging::warn!(self.log, "userinfo cache refresh failed"; "uid" => uid, "error" => %e);
        }

        // Step 4: single-login claim.
        match redischat::claim::try_claim(&mut conn, uid, self.login_claim_ttl_secs)? {
            Some(prev) => {
                let occupying_server_id = prev.parse::<u32>().unwrap_or(0);
                return Err(ChatError::Conflict { occupying_server_id });
            }
            None => {}
        }

        // Step 5: mint token.
        let token = redischat::token::mint_token(&mut conn, uid, self.token_ttl_secs)?;

        logging::info!(self.log, "login ok"; "uid" => uid, "server_id" => server_id);

        // Step 6: reply.
        Ok(LoginResponse { token, server_addr, uid })
    }

    pub fn register(&self, username: &str, password: &str) -> ChatResult<UserId> {
        self.users.register(username, password)
    }
}
