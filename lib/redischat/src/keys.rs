//! Redis key naming, collected in one place so every caller builds keys the
//! same way.

use flux::{ServerId, UserId};

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn status_key(uid: UserId) -> String {
    format!("status:{}", uid)
}

pub fn userinfo_key(uid: UserId) -> String {
    format!("userinfo:{}", uid)
}

pub fn server_list_key() -> &'static str {
    "server_list"
}

pub fn stream_key(server_id: ServerId) -> String {
    format!("stream:server:{}", server_id)
}

pub fn streamctl_key(server_id: ServerId) -> String {
    format!("stream:serverctl:{}", server_id)
}

pub fn group_name(server_id: ServerId) -> String {
    format!("message_group{}", server_id)
}

pub fn tmplock_key(name: &str) -> String {
    format!("tmplock:{}", name)
}
