//! One typed error used end to end, covering every Kind the protocol can
//! surface rather than splitting the wire layer off into its own error type.
//! Every fallible operation in the workspace returns
//! `ChatResult<T>`; only the boundary (Rocket responder, socket close) turns
//! a `ChatError` into something protocol-specific.

use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ChatError {
    #[error("malformed request")]
    BadRequest,

    #[error("bad credentials")]
    BadCredentials,

    #[error("already exists")]
    AlreadyExists,

    #[error("conflict: already logged in on server {occupying_server_id}")]
    Conflict { occupying_server_id: u32 },

    #[error("not found")]
    NotFound,

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("frame exceeds maximum size")]
    FrameTooLarge,

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("pool stopped")]
    PoolStopped,

    #[error("clock regression detected")]
    ClockRegression,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Whether this error should collapse into the generic 403 the gateway
    /// returns for login: credential and lookup failures both render as a
    /// single indistinguishable 403 body, so a client can't tell "wrong
    /// password" from "no such user".
    pub fn is_bad_credentials(&self) -> bool {
        matches!(self, ChatError::BadCredentials | ChatError::NotFound)
    }
}
