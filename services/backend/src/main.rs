mod mailbox_consumer;
mod online_writer;
mod reactor;
mod registry;
mod reporter;
mod session;
mod worker;

use backend::config;

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{App, Arg};
use mio::net::TcpStream as MioTcpStream;

use flux::logging;
use pool::Pool;

use crate::online_writer::OnlineWriter;
use crate::reactor::{IncomingHandle, Reactor};
use crate::registry::Registry;

fn main() {
    let matches = App::new("Backend Service")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Terminates client chat sessions and routes messages locally or via Redis streams.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the config file")
                .required(true),
        )
        .get_matches();

    let config_file_path = matches.value_of("CONFIG_FILE").unwrap();
    let cfg: config::BackendConfig =
        flux::config::load(config_file_path).expect("failed to load backend config");

    let log = logging::init_default("backend");
    logging::info!(log, "starting backend service"; "listen" => &cfg.listen, "id" => cfg.id);

    let redis_url = cfg.common.redis_url.clone();
    let redis_pool: Pool<redis::Connection> = Pool::new(16, move || {
        let client = redis::Client::open(redis_url.as_str())
            .map_err(|e| flux::ChatError::UpstreamUnavailable(format!("redis client: {}", e)))?;
        client
            .get_connection()
            .map_err(|e| flux::ChatError::UpstreamUnavailable(format!("redis connect: {}", e)))
    });

    let registry = Arc::new(Registry::new());

    let online = OnlineWriter::spawn(
        Duration::from_millis(cfg.common.online_flush_interval_ms),
        redis_pool.clone(),
        log.new(logging::o!("component" => "online_writer")),
    );

    let (worker, _worker_join) = worker::spawn(
        cfg.id,
        registry.clone(),
        redis_pool.clone(),
        online.clone(),
        log.new(logging::o!("component" => "worker")),
    );

    let (_mailbox, _mailbox_join) = mailbox_consumer::spawn(
        cfg.id,
        registry.clone(),
        redis_pool,
        log.new(logging::o!("component" => "mailbox")),
    );

    let status = statusclient::StatusClient::new(cfg.common.status_url.clone());
    status
        .register_server(cfg.id, &cfg.public_addr, 0)
        .expect("initial registration with status service failed");

    let _reporter = reporter::Reporter::spawn(
        cfg.id,
        cfg.public_addr.clone(),
        Duration::from_millis(cfg.common.report_interval_ms),
        status,
        registry.clone(),
        log.new(logging::o!("component" => "reporter")),
    );

    let mut incoming_handles: Vec<IncomingHandle> = Vec::with_capacity(cfg.reactor_threads);

    for i in 0..cfg.reactor_threads {
        let (mut reactor, incoming) = Reactor::new(
            worker.clone(),
            registry.clone(),
            log.new(logging::o!("component" => "reactor", "shard" => i)),
        )
        .expect("failed to build reactor");

        incoming_handles.push(incoming);
        thread::spawn(move || reactor.run());
    }

    let listener = StdTcpListener::bind(&cfg.listen).expect("failed to bind listener");
    logging::info!(log, "accepting connections"; "listen" => &cfg.listen);

    let mut next_shard = 0usize;
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                logging::warn!(log, "accept failed"; "error" => %e);
                continue;
            }
        };

        if stream.set_nonblocking(true).is_err() {
            continue;
        }

        let mio_stream = match MioTcpStream::from_stream(stream) {
            Ok(s) => s,
            Err(_) => continue,
        };

        incoming_handles[next_shard].push(mio_stream);
        next_shard = (next_shard + 1) % incoming_handles.len();
    }
}
