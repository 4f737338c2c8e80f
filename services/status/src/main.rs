#[macro_use]
extern crate rocket;

mod core;
mod mirror;

use status::config;

use std::sync::Arc;
use std::time::Duration;

use clap::{App, Arg};
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};

use flux::logging;
use loadindex::ServerInfo;
use pool::Pool;

use crate::core::{ReportOutcome, StatusCore};
use crate::mirror::Mirror;

#[derive(Deserialize)]
struct RegisterReq {
    id: u32,
    addr: String,
    load: u32,
}

#[derive(Serialize)]
struct Ack {
    result: i32,
}

#[derive(Deserialize)]
struct ReportReq {
    id: u32,
    load: u32,
}

#[derive(Serialize)]
struct ReportResp {
    result: i32,
    not_found: bool,
}

#[derive(Serialize)]
struct MinLoadResp {
    found: bool,
    id: u32,
    addr: String,
}

#[derive(Serialize)]
struct ServerInfoResp {
    id: u32,
    addr: String,
    load: u32,
    last_ts: u64,
}

impl From<ServerInfo> for ServerInfoResp {
    fn from(s: ServerInfo) -> Self {
        ServerInfoResp {
            id: s.id,
            addr: s.addr,
            load: s.load,
            last_ts: s.last_ts,
        }
    }
}

#[post("/rpc/register_server", data = "<req>")]
fn register_server(core: &State<Arc<StatusCore>>, req: Json<RegisterReq>) -> Json<Ack> {
    core.register_server(req.id, req.addr.clone(), req.load);
    Json(Ack { result: 0 })
}

#[post("/rpc/report_server_load", data = "<req>")]
fn report_server_load(core: &State<Arc<StatusCore>>, req: Json<ReportReq>) -> Json<ReportResp> {
    match core.report_server_load(req.id, req.load) {
        ReportOutcome::Ok => Json(ReportResp { result: 0, not_found: false }),
        ReportOutcome::NotFound => Json(ReportResp { result: 1, not_found: true }),
    }
}

#[get("/rpc/check_minimal_load_server")]
fn check_minimal_load_server(core: &State<Arc<StatusCore>>) -> Json<MinLoadResp> {
    match core.check_minimal_load_server() {
        Some(info) => Json(MinLoadResp { found: true, id: info.id, addr: info.addr }),
        None => Json(MinLoadResp { found: false, id: 0, addr: String::new() }),
    }
}

/// Debug route: a plain HTTP accessor for the current heap snapshot, so an
/// operator can inspect live server load without a Redis detour.
#[get("/rpc/dump")]
fn dump_server_list(core: &State<Arc<StatusCore>>) -> Json<Vec<ServerInfoResp>> {
    Json(core.dump_server_list().into_iter().map(ServerInfoResp::from).collect())
}

#[get("/ping")]
fn ping() -> &'static str {
    "pong"
}

#[rocket::main]
async fn main() {
    let matches = App::new("Status Service")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs the load-balancing status service.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the config file")
                .required(true),
        )
        .get_matches();

    let config_file_path = matches.value_of("CONFIG_FILE").unwrap();
    let cfg: config::StatusConfig =
        flux::config::load(config_file_path).expect("failed to load status config");

    let log = logging::init_default("status");
    logging::info!(log, "starting status service"; "listen" => &cfg.listen);

    let redis_url = cfg.common.redis_url.clone();
    let redis_pool: Pool<redis::Connection> = Pool::new(8, move || {
        let client = redis::Client::open(redis_url.as_str())
            .map_err(|e| flux::ChatError::UpstreamUnavailable(format!("redis client: {}", e)))?;
        client
            .get_connection()
            .map_err(|e| flux::ChatError::UpstreamUnavailable(format!("redis connect: {}", e)))
    });

    let mirror_interval = Duration::from_millis(cfg.common.mirror_interval_ms);
    let core = Arc::new_cyclic(|weak: &std::sync::Weak<StatusCore>| {
        let weak_for_mirror = weak.clone();
        let mirror_log = log.new(logging::o!("component" => "mirror"));
        let mirror = Mirror::spawn(
            mirror_interval,
            redis_pool,
            move || match weak_for_mirror.upgrade() {
                Some(core) => {
                    core.check_ttl_now();
                    core.snapshot_for_mirror()
                }
                None => Vec::new(),
            },
            mirror_log,
        );
        StatusCore::new(mirror, log.new(logging::o!("component" => "status")))
    });

    let _ = rocket::build()
        .manage(core)
        .mount(
            "/",
            routes![register_server, report_server_load, check_minimal_load_server, dump_server_list, ping],
        )
        .launch()
        .await
        .expect("rocket launch failed");
}
