//! Mailbox consumer (C11): one long-lived worker per backend, draining both
//! Redis streams for this server id and injecting frames into local
//! sessions. Uses a 2s `XREADGROUP BLOCK` so the loop stays cancellable
//! rather than blocking forever on an idle stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use byteorder::{BigEndian, WriteBytesExt};

use flux::logging;
use flux::ServerId;
use netframe::Tag;
use pool::Pool;
use redis::Connection;

use crate::registry::Registry;
use redischat::{StreamEntry, StreamKind};

const BLOCK_MS: u64 = 2_000;
const READ_COUNT: usize = 10;

pub struct MailboxConsumer {
    stop: Arc<AtomicBool>,
}

impl MailboxConsumer {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

pub fn spawn(
    server_id: ServerId,
    registry: Arc<Registry>,
    redis_pool: Pool<Connection>,
    log: logging::Logger,
) -> (MailboxConsumer, JoinHandle<()>) {
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = stop.clone();

    let join = thread::spawn(move || {
        {
            let mut conn = match redis_pool.acquire() {
                Ok(conn) => conn,
                Err(e) => {
                    logging::error!(log, "mailbox consumer: could not reach redis at startup"; "error" => %e);
                    return;
                }
            };
            if let Err(e) = redischat::streams::ensure_consumer_group(&mut conn, server_id) {
                logging::error!(log, "mailbox consumer: consumer group setup failed"; "error" => %e);
                return;
            }
        }

        let consumer_name = format!("backend-{}", server_id);

        while !worker_stop.load(Ordering::Acquire) {
            let mut conn = match redis_pool.acquire() {
                Ok(conn) => conn,
                Err(e) => {
                    logging::warn!(log, "mailbox consumer: redis pool unavailable"; "error" => %e);
                    thread::sleep(std::time::Duration::from_millis(BLOCK_MS));
                    continue;
                }
            };

            let entries = match redischat::streams::read_group(
                &mut conn,
                server_id,
                &consumer_name,
                BLOCK_MS,
                READ_COUNT,
            ) {
                Ok(entries) => entries,
                Err(e) => {
                    logging::warn!(log, "mailbox consumer: xreadgroup failed"; "error" => %e);
                    thread::sleep(std::time::Duration::from_millis(BLOCK_MS));
                    continue;
                }
            };

            for entry in entries {
                dispatch_entry(&registry, entry, &log);
            }
        }
    });

    (MailboxConsumer { stop }, join)
}

fn dispatch_entry(registry: &Registry, entry: StreamEntry, log: &logging::Logger) {
    match entry.kind {
        StreamKind::Chat => {
            let from: u64 = match entry.fields.get("from").and_then(|v| v.parse().ok()) {
                Some(v) => v,
                None => return,
            };
            let to: u64 = match entry.fields.get("to").and_then(|v| v.parse().ok()) {
                Some(v) => v,
                None => return,
            };
            let content = entry.fields.get("content").map(String::as_bytes).unwrap_or(b"");

            match registry.get(to) {
                Some(session) => {
                    let mut payload = Vec::with_capacity(8 + content.len());
                    payload.write_u64::<BigEndian>(from).expect("write into Vec never fails");
                    payload.extend_from_slice(content);
                    session.send(Tag::ChatMsgToCli, &payload);
                }
                None => {
                    logging::debug!(log, "mailbox: recipient not local, dropping"; "to" => to);
                }
            }
        }
        StreamKind::Control => {
            if entry.fields.get("type").map(String::as_str) != Some("kick") {
                return;
            }
            let uid: u64 = match entry.fields.get("uid").and_then(|v| v.parse().ok()) {
                Some(v) => v,
                None => return,
            };
            if let Some(session) = registry.get(uid) {
                session.close();
            }
        }
    }
}
