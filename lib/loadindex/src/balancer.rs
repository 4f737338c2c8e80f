//! Load balancer (C3): wraps the indexed min-heap behind one mutex and
//! exposes the register/report/select/evict surface the Status service's
//! RPCs call into directly. A server past `SERVER_TIMEOUT` since its last
//! report is treated as dead and evicted rather than picked.

use std::sync::Mutex;

use flux::time::timestamp_ms;
use flux::ServerId;

use crate::heap::{Hint, IndexedHeap};

/// Stale-backend threshold: a server with no report in this long is treated
/// as gone on the next heap read.
pub const SERVER_TIMEOUT_MS: u64 = 40_000;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServerInfo {
    pub id: ServerId,
    pub addr: String,
    pub load: u32,
    pub last_ts: u64,
}

impl crate::heap::HeapEntry for ServerInfo {
    type Id = ServerId;

    fn id(&self) -> ServerId {
        self.id
    }

    fn order_key(&self) -> u32 {
        self.load
    }
}

pub struct LoadBalancer {
    heap: Mutex<IndexedHeap<ServerInfo>>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        LoadBalancer {
            heap: Mutex::new(IndexedHeap::new()),
        }
    }

    /// Insert a new backend, or update `addr`/`load`/`last_ts` for an
    /// existing one. Duplicate registration is update-in-place, never a
    /// duplicate entry.
    pub fn register_server(&self, id: ServerId, addr: String, load: u32) {
        let info = ServerInfo {
            id,
            addr,
            load,
            last_ts: timestamp_ms(),
        };
        self.heap.lock().unwrap().insert_or_update(info, Hint::Either);
    }

    /// Refreshes load and timestamp for a known id. Returns `false` if the
    /// id is unknown so the caller can surface `NOT_FOUND`.
    pub fn update_load(&self, id: ServerId, load: u32) -> bool {
        let mut heap = self.heap.lock().unwrap();
        let existing = match heap.get(&id).cloned() {
            Some(existing) => existing,
            None => return false,
        };
        heap.insert_or_update(
            ServerInfo {
                load,
                last_ts: timestamp_ms(),
                ..existing
            },
            Hint::Either,
        );
        true
    }

    pub fn remove_server(&self, id: ServerId) -> Option<ServerInfo> {
        self.heap.lock().unwrap().remove(&id)
    }

    /// Evicts the root while it is stale, returning the first fresh root
    /// (if any) and whether an eviction happened along the way. Callers
    /// that see `did_evict == true` should trigger a mirror refresh.
    pub fn min_load(&self) -> (Option<ServerInfo>, bool) {
        let mut heap = self.heap.lock().unwrap();
        let now = timestamp_ms();
        let mut did_evict = false;

        loop {
            match heap.top() {
                Some(top) if now.saturating_sub(top.last_ts) >= SERVER_TIMEOUT_MS => {
                    heap.pop();
                    did_evict = true;
                }
                Some(top) => return (Some(top.clone()), did_evict),
                None => return (None, did_evict),
            }
        }
    }

    /// Sweeps every stale entry, not just the root. Returns the number
    /// evicted.
    pub fn check_ttl(&self) -> usize {
        let mut heap = self.heap.lock().unwrap();
        let now = timestamp_ms();

        let stale_ids: Vec<ServerId> = heap
            .iter()
            .filter(|info| now.saturating_sub(info.last_ts) >= SERVER_TIMEOUT_MS)
            .map(|info| info.id)
            .collect();

        for id in &stale_ids {
            heap.remove(id);
        }

        stale_ids.len()
    }

    pub fn snapshot(&self) -> Vec<ServerInfo> {
        self.heap.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().unwrap().is_empty()
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_update_in_place() {
        let lb = LoadBalancer::new();
        lb.register_server(1, "10.0.0.1:1000".into(), 5);
        lb.register_server(1, "10.0.0.1:1001".into(), 9);

        assert_eq!(lb.len(), 1);
        let snap = lb.snapshot();
        assert_eq!(snap[0].addr, "10.0.0.1:1001");
        assert_eq!(snap[0].load, 9);
    }

    #[test]
    fn update_load_unknown_id_returns_false() {
        let lb = LoadBalancer::new();
        assert!(!lb.update_load(42, 1));
    }

    #[test]
    fn min_load_picks_lowest_live_load() {
        let lb = LoadBalancer::new();
        lb.register_server(1, "a".into(), 5);
        lb.register_server(2, "b".into(), 1);
        lb.register_server(3, "c".into(), 9);

        let (top, evicted) = lb.min_load();
        assert!(!evicted);
        assert_eq!(top.unwrap().id, 2);
    }

    #[test]
    fn min_load_evicts_stale_root_first() {
        let lb = LoadBalancer::new();
        lb.heap.lock().unwrap().insert_or_update(
            ServerInfo {
                id: 1,
                addr: "stale".into(),
                load: 0,
                last_ts: 0,
            },
            crate::heap::Hint::Up,
        );
        lb.register_server(2, "fresh".into(), 10);

        let (top, evicted) = lb.min_load();
        assert!(evicted);
        assert_eq!(top.unwrap().id, 2);
        assert_eq!(lb.len(), 1);
    }

    #[test]
    fn check_ttl_sweeps_all_stale_entries() {
        let lb = LoadBalancer::new();
        for id in 1..=3u32 {
            lb.heap.lock().unwrap().insert_or_update(
                ServerInfo {
                    id,
                    addr: format!("s{}", id),
                    load: id,
                    last_ts: 0,
                },
                crate::heap::Hint::Up,
            );
        }
        lb.register_server(4, "fresh".into(), 1);

        let evicted = lb.check_ttl();
        assert_eq!(evicted, 3);
        assert_eq!(lb.len(), 1);
        assert_eq!(lb.snapshot()[0].id, 4);
    }

    #[test]
    fn remove_server_hard_deletes() {
        let lb = LoadBalancer::new();
        lb.register_server(1, "a".into(), 1);
        assert!(lb.remove_server(1).is_some());
        assert!(lb.is_empty());
        assert!(lb.remove_server(1).is_none());
    }
}
