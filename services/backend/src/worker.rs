//! Message worker (C10): the single consumer that dispatches every decoded
//! frame by tag, plus session tombstones. A single-consumer dispatch loop
//! keyed by tag, on its own thread fed by an unbounded channel rather than
//! an ad-hoc condvar queue.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Deserialize;

use flux::logging;
use flux::{ServerId, UserId};
use netframe::{Frame, Tag};
use pool::Pool;
use redis::Connection;

use crate::online_writer::OnlineWriter;
use crate::registry::Registry;
use crate::session::{SessionHandle, SessionId};

pub enum WorkItem {
    Frame { session: SessionHandle, frame: Frame },
    Tombstone { session_id: SessionId, uid: Option<UserId> },
}

#[derive(Clone)]
pub struct WorkerHandle {
    tx: Sender<WorkItem>,
}

impl WorkerHandle {
    pub fn post(&self, item: WorkItem) {
        // An unbounded channel never blocks the reactor thread; a closed
        // receiver only happens during shutdown, where dropping the item is
        // correct.
        let _ = self.tx.send(item);
    }
}

#[derive(Deserialize)]
struct VerifyBody {
    uid: UserId,
    token: String,
}

pub fn spawn(
    server_id: ServerId,
    registry: Arc<Registry>,
    redis_pool: Pool<Connection>,
    online: OnlineWriter,
    log: logging::Logger,
) -> (WorkerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();

    let join = thread::spawn(move || run(server_id, registry, redis_pool, online, rx, log));

    (WorkerHandle { tx }, join)
}

fn run(
    server_id: ServerId,
    registry: Arc<Registry>,
    redis_pool: Pool<Connection>,
    online: OnlineWriter,
    rx: Receiver<WorkItem>,
    log: logging::Logger,
) {
    for item in rx {
        match item {
            WorkItem::Frame { session, frame } => {
                dispatch_frame(server_id, &registry, &redis_pool, &online, &session, frame, &log)
            }
            WorkItem::Tombstone { session_id, uid } => {
                if let Some(uid) = uid {
                    registry.remove(uid);
                    online.mark_removed(uid);
                } else {
                    registry.remove_temp(session_id);
                }
            }
        }
    }
}

fn dispatch_frame(
    server_id: ServerId,
    registry: &Registry,
    redis_pool: &Pool<Connection>,
    online: &OnlineWriter,
    session: &SessionHandle,
    frame: Frame,
    log: &logging::Logger,
) {
    match frame.tag {
        Tag::Debug => {
            logging::debug!(log, "debug frame"; "session" => session.id, "len" => frame.payload.len());
        }

        Tag::Verify => {
            if !session.is_unverified() {
                // Already verified or closed -- a second VERIFY is a
                // protocol violation.
                session.close();
                return;
            }
            handle_verify(server_id, registry, redis_pool, online, session, &frame.payload, log);
        }

        Tag::ChatMsg => {
            let from = match session.uid() {
                Some(uid) => uid,
                None => {
                    // Unverified senders may never produce CHAT_MSG.
                    session.close();
                    return;
                }
            };
            handle_chat_msg(server_id, registry, redis_pool, from, &frame.payload, log);
        }

        Tag::GroupChatMsg => {
            logging::debug!(log, "group chat message received, unimplemented"; "session" => session.id);
        }

        Tag::Ping => {}

        Tag::VerifyDone | Tag::ChatMsgToCli => {
            // Server-to-client-only tags; a client sending one of these is
            // malformed.
            session.close();
        }
    }
}

fn handle_verify(
    server_id: ServerId,
    registry: &Registry,
    redis_pool: &Pool<Connection>,
    online: &OnlineWriter,
    session: &SessionHandle,
    payload: &[u8],
    log: &logging::Logger,
) {
    let body: VerifyBody = match serde_json::from_slice(payload) {
        Ok(body) => body,
        Err(_) => {
            session.close();
            return;
        }
    };

    let mut conn = match redis_pool.acquire() {
        Ok(conn) => conn,
        Err(e) => {
            logging::warn!(log, "verify: redis pool unavailable"; "error" => %e);
            session.close();
            return;
        }
    };

    let looked_up = redischat::token::lookup_token(&mut conn, &body.token);
    match looked_up {
        Ok(Some(uid)) if uid == body.uid => {
            if !registry.promote(uid, session.clone()) {
                logging::warn!(log, "verify: uid already verified on this backend"; "uid" => uid);
                session.close();
                return;
            }
            session.mark_verified(uid);

            if let Err(e) = redischat::claim::finalize_claim(&mut conn, uid, server_id) {
                logging::warn!(log, "verify: claim finalize failed"; "uid" => uid, "error" => %e);
            }

            online.mark_active(uid);
            session.send(Tag::VerifyDone, b"ok");
        }
        _ => session.close(),
    }
}

fn handle_chat_msg(
    server_id: ServerId,
    registry: &Registry,
    redis_pool: &Pool<Connection>,
    from: UserId,
    payload: &[u8],
    log: &logging::Logger,
) {
    if payload.len() < 8 {
        logging::debug!(log, "chat_msg payload too short"; "from" => from);
        return;
    }

    let mut cursor = &payload[..8];
    let to = cursor.read_u64::<BigEndian>().expect("8-byte slice always reads");
    let content = &payload[8..];

    if let Some(peer) = registry.get(to) {
        let mut out = Vec::with_capacity(8 + content.len());
        out.write_u64::<BigEndian>(from).expect("write into Vec never fails");
        out.extend_from_slice(content);
        peer.send(Tag::ChatMsgToCli, &out);
        return;
    }

    let mut conn = match redis_pool.acquire() {
        Ok(conn) => conn,
        Err(e) => {
            logging::warn!(log, "chat_msg: redis pool unavailable"; "error" => %e);
            return;
        }
    };

    match redischat::claim::locate(&mut conn, to) {
        Ok(Some(remote_server)) if remote_server != server_id => {
            if let Err(e) = redischat::streams::publish_chat(&mut conn, remote_server, from, to, content) {
                logging::warn!(log, "chat_msg: publish to remote stream failed"; "to" => to, "error" => %e);
            }
        }
        Ok(_) => {
            // Either unknown, or located on this server but not in the
            // registry (a race with the peer's own close) -- drop.
        }
        Err(e) => {
            logging::warn!(log, "chat_msg: locate failed"; "to" => to, "error" => %e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::test_session;
    use byteorder::WriteBytesExt;
    use flux::error::ChatError;

    fn unreachable_pool() -> Pool<Connection> {
        Pool::new(1, || Err(ChatError::Internal("redis unavailable in tests".to_owned())))
    }

    fn test_log() -> logging::Logger {
        logging::Logger::root(logging::Discard, logging::o!())
    }

    fn chat_payload(to: UserId, content: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(8 + content.len());
        payload.write_u64::<BigEndian>(to).unwrap();
        payload.extend_from_slice(content);
        payload
    }

    #[test]
    fn local_hit_rewrites_tag_and_uid_prefix() {
        let registry = Registry::new();
        let (_peer_session, peer) = test_session(1);
        registry.promote(11, peer.clone());

        let payload = chat_payload(11, b"hi");
        handle_chat_msg(100, &registry, &unreachable_pool(), 7, &payload, &test_log());

        let queued = peer.test_peek_outbound();
        assert_eq!(queued.len(), 1);
        let mut expected = Vec::new();
        expected.write_u32::<BigEndian>(Tag::ChatMsgToCli.into()).unwrap();
        expected.write_u32::<BigEndian>(10).unwrap();
        expected.write_u64::<BigEndian>(7).unwrap();
        expected.extend_from_slice(b"hi");
        assert_eq!(queued[0], expected);
    }

    #[test]
    fn unverified_sender_is_closed_not_dispatched() {
        let (_session, handle) = test_session(2);
        assert!(handle.is_unverified());

        let frame = Frame::new(Tag::ChatMsg, chat_payload(11, b"hi"));
        let registry = Registry::new();
        dispatch_frame(100, &registry, &unreachable_pool(), &OnlineWriter::disabled(), &handle, frame, &test_log());

        assert!(handle.is_closed());
    }

    #[test]
    fn malformed_verify_body_closes_session() {
        let (_session, handle) = test_session(3);
        let frame = Frame::new(Tag::Verify, b"not json".to_vec());
        let registry = Registry::new();
        dispatch_frame(100, &registry, &unreachable_pool(), &OnlineWriter::disabled(), &handle, frame, &test_log());

        assert!(handle.is_closed());
    }

    #[test]
    fn ping_is_a_no_op() {
        let (_session, handle) = test_session(4);
        let frame = Frame::new(Tag::Ping, Vec::new());
        let registry = Registry::new();
        dispatch_frame(100, &registry, &unreachable_pool(), &OnlineWriter::disabled(), &handle, frame, &test_log());

        assert!(handle.is_unverified());
        assert!(!handle.is_closed());
    }
}
