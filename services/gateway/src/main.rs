#[macro_use]
extern crate rocket;

mod login;

use gateway::config;

use std::sync::Arc;

use clap::{App, Arg};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};

use flux::error::ChatError;
use flux::logging;
use pool::Pool;
use userstore::SqliteUserStore;

use crate::login::LoginPipeline;

#[derive(Deserialize)]
struct LoginReq {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResp {
    token: String,
    server_addr: String,
    uid: u64,
}

#[derive(Deserialize)]
struct RegisterReq {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct RegisterResp {
    uid: u64,
}

#[derive(Serialize)]
struct ErrResp {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    occupying_server_id: Option<u32>,
}

/// Maps a `ChatError` onto an HTTP status. Login collapses every
/// credential/lookup failure into 403; a claim conflict is 409 with the
/// occupying server id in the body; everything else is a 500.
fn err_status(e: &ChatError) -> Status {
    if e.is_bad_credentials() {
        return Status::Forbidden;
    }
    match e {
        ChatError::AlreadyExists => Status::Forbidden,
        ChatError::Conflict { .. } => Status::Conflict,
        ChatError::BadRequest => Status::BadRequest,
        ChatError::Unauthenticated => Status::Unauthorized,
        _ => Status::InternalServerError,
    }
}

fn err_body(e: &ChatError) -> ErrResp {
    let occupying_server_id = match e {
        ChatError::Conflict { occupying_server_id } => Some(*occupying_server_id),
        _ => None,
    };
    ErrResp { error: e.to_string(), occupying_server_id }
}

#[post("/login", data = "<req>")]
fn login(pipeline: &State<Arc<LoginPipeline>>, req: Json<LoginReq>) -> (Status, Json<serde_json::Value>) {
    match pipeline.login(&req.username, &req.password) {
        Ok(resp) => (
            Status::Ok,
            Json(
                serde_json::to_value(LoginResp {
                    token: resp.token,
                    server_addr: resp.server_addr,
                    uid: resp.uid,
                })
                .expect("LoginResp is always serializable"),
            ),
        ),
        Err(e) => (
            err_status(&e),
            Json(serde_json::to_value(err_body(&e)).expect("ErrResp is always serializable")),
        ),
    }
}

#[post("/register", data = "<req>")]
fn register(pipeline: &State<Arc<LoginPipeline>>, req: Json<RegisterReq>) -> (Status, Json<serde_json::Value>) {
    match pipeline.register(&req.username, &req.password) {
        Ok(uid) => (
            Status::Ok,
            Json(serde_json::to_value(RegisterResp { uid }).expect("RegisterResp is always serializable")),
        ),
        Err(e) => (
            err_status(&e),
            Json(serde_json::to_value(err_body(&e)).expect("ErrResp is always serializable")),
        ),
    }
}

#[get("/ping")]
fn ping() -> &'static str {
    "pong"
}

#[rocket::main]
async fn main() {
    let matches = App::new("Gateway Service")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Terminates login/register HTTP requests and hands the client off to a backend.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the config file")
                .required(true),
        )
        .get_matches();

    let config_file_path = matches.value_of("CONFIG_FILE").unwrap();
    let cfg: config::GatewayConfig =
        flux::config::load(config_file_path).expect("failed to load gateway config");

    let log = logging::init_default("gateway");
    logging::info!(log, "starting gateway service"; "listen" => &cfg.listen);

    let users: Arc<dyn userstore::UserStore> = Arc::new(
        SqliteUserStore::open(&cfg.db_path, 8, cfg.worker_id).expect("failed to open user store"),
    );

    let status = statusclient::StatusClient::new(cfg.common.status_url.clone());

    let redis_url = cfg.common.redis_url.clone();
    let redis_pool: Pool<redis::Connection> = Pool::new(8, move || {
        let client = redis::Client::open(redis_url.as_str())
            .map_err(|e| flux::ChatError::UpstreamUnavailable(format!("redis client: {}", e)))?;
        client
            .get_connection()
            .map_err(|e| flux::ChatError::UpstreamUnavailable(format!("redis connect: {}", e)))
    });

    let pipeline = Arc::new(LoginPipeline::new(
        users,
        status,
        redis_pool,
        cfg.common.login_claim_ttl_secs,
        cfg.common.token_ttl_secs,
        log.new(logging::o!("component" => "login")),
    ));

    let _ = rocket::build()
        .manage(pipeline)
        .mount("/", routes![login, register, ping])
        .launch()
        .await
        .expect("rocket launch failed");
}
