//! The per-backend stream pair (C11): `stream:server:{id}` for chat
//! payloads, `stream:serverctl:{id}` for control messages (kick), each
//! bound to consumer group `message_group{id}`. Command shapes (XADD with
//! field list, idempotent `XGROUP CREATE ... MKSTREAM`, approximate
//! `XTRIM MAXLEN ~`) use the synchronous `redis` client throughout, matching
//! the blocking-worker model the rest of this crate uses.

use redis::Connection;
use std::collections::HashMap;

use flux::error::ChatError;
use flux::error::ChatResult;
use flux::{ServerId, UserId};

use crate::keys::{group_name, streamctl_key, stream_key};

/// Approximate cap enforced on both streams so an unread mailbox can't grow
/// without bound.
const MAXLEN_APPROX: u64 = 1000;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StreamKind {
    Chat,
    Control,
}

#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub kind: StreamKind,
    pub entry_id: String,
    pub fields: HashMap<String, String>,
}

/// Idempotently creates both consumer groups for `server_id`. Safe to call
/// on every backend startup; an existing group surfaces `BUSYGROUP`, which
/// is swallowed.
pub fn ensure_consumer_group(conn: &mut Connection, server_id: ServerId) -> ChatResult<()> {
    create_group_idempotent(conn, &stream_key(server_id), &group_name(server_id))?;
    create_group_idempotent(conn, &streamctl_key(server_id), &group_name(server_id))
}

fn create_group_idempotent(conn: &mut Connection, key: &str, group: &str) -> ChatResult<()> {
    let result: redis::RedisResult<()> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(key)
        .arg(group)
        .arg("$")
        .arg("MKSTREAM")
        .query(conn);

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
        Err(e) => Err(ChatError::UpstreamUnavailable(format!("xgroup create: {}", e))),
    }
}

/// Delivers a chat message to a remote backend's mailbox.
pub fn publish_chat(
    conn: &mut Connection,
    to_server: ServerId,
    from: UserId,
    to: UserId,
    content: &[u8],
) -> ChatResult<String> {
    let key = stream_key(to_server);
    let content_str = String::from_utf8_lossy(content);

    let entry_id: String = redis::cmd("XADD")
        .arg(&key)
        .arg("MAXLEN")
        .arg("~")
        .arg(MAXLEN_APPROX)
        .arg("*")
        .arg("from")
        .arg(from)
        .arg("to")
        .arg(to)
        .arg("content")
        .arg(content_str.as_ref())
        .query(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("xadd chat: {}", e)))?;

    Ok(entry_id)
}

/// Writes a kick control message for `uid` onto the target backend's
/// control mailbox.
pub fn publish_kick(conn: &mut Connection, target_server: ServerId, uid: UserId) -> ChatResult<String> {
    let key = streamctl_key(target_server);

    redis::cmd("XADD")
        .arg(&key)
        .arg("*")
        .arg("type")
        .arg("kick")
        .arg("uid")
        .arg(uid)
        .query(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("xadd kick: {}", e)))
}

/// `XREADGROUP BLOCK {block_ms} COUNT {count}` over both streams for this
/// backend, with `NOACK`. Entries are tagged with which stream they came
/// from so the caller can dispatch accordingly.
pub fn read_group(
    conn: &mut Connection,
    server_id: ServerId,
    consumer: &str,
    block_ms: u64,
    count: usize,
) -> ChatResult<Vec<StreamEntry>> {
    let group = group_name(server_id);
    let chat_key = stream_key(server_id);
    let ctl_key = streamctl_key(server_id);

    type Reply = Vec<(String, Vec<(String, Vec<(String, String)>)>)>;

    let reply: Option<Reply> = redis::cmd("XREADGROUP")
        .arg("GROUP")
        .arg(&group)
        .arg(consumer)
        .arg("BLOCK")
        .arg(block_ms)
        .arg("COUNT")
        .arg(count)
        .arg("NOACK")
        .arg("STREAMS")
        .arg(&chat_key)
        .arg(&ctl_key)
        .arg(">")
        .arg(">")
        .query(conn)
        .map_err(|e| ChatError::UpstreamUnavailable(format!("xreadgroup: {}", e)))?;

    let mut out = Vec::new();
    for (stream_name, entries) in reply.unwrap_or_default() {
        let kind = if stream_name == chat_key {
            StreamKind::Chat
        } else {
            StreamKind::Control
        };

        for (entry_id, field_pairs) in entries {
            let fields: HashMap<String, String> = field_pairs.into_iter().collect();
            out.push(StreamEntry { kind: kind.clone(), entry_id, fields });
        }
    }

    Ok(out)
}

/// Approximate ack -- `NOACK` means there is nothing pending to ack, but
/// kept as a no-op entry point in case a future deployment drops `NOACK`
/// for at-least-once delivery.
pub fn ack(_conn: &mut Connection, _server_id: ServerId, _entry_id: &str) -> ChatResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_kind_is_tagged_by_key_match() {
        let chat_key = stream_key(7);
        let ctl_key = streamctl_key(7);
        assert_ne!(chat_key, ctl_key);
    }
}
