//! Blocking HTTP/JSON client for the Status RPC surface (C4), implemented as
//! plain HTTP/JSON over `reqwest`'s blocking client. Called from the
//! dedicated worker threads set aside for blocking work -- never from a
//! reactor thread.

use serde::{Deserialize, Serialize};

use flux::error::{ChatError, ChatResult};
use flux::ServerId;

#[derive(Clone)]
pub struct StatusClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Serialize)]
struct RegisterReq {
    id: ServerId,
    addr: String,
    load: u32,
}

#[derive(Deserialize)]
struct Ack {
    #[allow(dead_code)]
    result: i32,
}

#[derive(Serialize)]
struct ReportReq {
    id: ServerId,
    load: u32,
}

#[derive(Deserialize)]
struct ReportResp {
    not_found: bool,
}

#[derive(Deserialize)]
struct MinLoadResp {
    found: bool,
    id: ServerId,
    addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfoResp {
    pub id: ServerId,
    pub addr: String,
    pub load: u32,
    pub last_ts: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReportOutcome {
    Ok,
    NotFound,
}

impl StatusClient {
    pub fn new(base_url: impl Into<String>) -> StatusClient {
        StatusClient {
            http: reqwest::blocking::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("failed to build status http client"),
            base_url: base_url.into(),
        }
    }

    pub fn register_server(&self, id: ServerId, addr: &str, load: u32) -> ChatResult<()> {
        self.http
            .post(format!("{}/rpc/register_server", self.base_url))
            .json(&RegisterReq { id, addr: addr.to_owned(), load })
            .send()
            .and_then(|r| r.json::<Ack>())
            .map(|_| ())
            .map_err(|e| ChatError::UpstreamUnavailable(format!("register_server: {}", e)))
    }

    pub fn report_server_load(&self, id: ServerId, load: u32) -> ChatResult<ReportOutcome> {
        let resp: ReportResp = self
            .http
            .post(format!("{}/rpc/report_server_load", self.base_url))
            .json(&ReportReq { id, load })
            .send()
            .and_then(|r| r.json())
            .map_err(|e| ChatError::UpstreamUnavailable(format!("report_server_load: {}", e)))?;

        Ok(if resp.not_found { ReportOutcome::NotFound } else { ReportOutcome::Ok })
    }

    pub fn check_minimal_load_server(&self) -> ChatResult<Option<(ServerId, String)>> {
        let resp: MinLoadResp = self
            .http
            .get(format!("{}/rpc/check_minimal_load_server", self.base_url))
            .send()
            .and_then(|r| r.json())
            .map_err(|e| ChatError::UpstreamUnavailable(format!("check_minimal_load_server: {}", e)))?;

        Ok(if resp.found { Some((resp.id, resp.addr)) } else { None })
    }

    pub fn dump_server_list(&self) -> ChatResult<Vec<ServerInfoResp>> {
        self.http
            .get(format!("{}/rpc/dump", self.base_url))
            .send()
            .and_then(|r| r.json())
            .map_err(|e| ChatError::UpstreamUnavailable(format!("dump_server_list: {}", e)))
    }
}
