//! Online-status writer (C13): batches TTL refreshes/removals for
//! `status:{uid}` into periodic pipelined Redis calls. Same signal-coalescing
//! shape as the status mirror: gather the pending batch under the mutex,
//! flush it without holding the lock, then clear it.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use flux::logging;
use flux::UserId;
use pool::Pool;
use redis::Connection;

const CLAIM_REFRESH_TTL_SECS: u64 = 30;

struct Shared {
    added: HashSet<UserId>,
    removed: HashSet<UserId>,
    signaled: bool,
    running: bool,
}

/// A handle to the writer's background thread. Cloning is cheap; every
/// clone shares the same pending batch and wakes the same worker.
#[derive(Clone)]
pub struct OnlineWriter {
    state: Arc<(Mutex<Shared>, Condvar)>,
}

impl OnlineWriter {
    pub fn disabled() -> OnlineWriter {
        OnlineWriter {
            state: Arc::new((
                Mutex::new(Shared {
                    added: HashSet::new(),
                    removed: HashSet::new(),
                    signaled: false,
                    running: false,
                }),
                Condvar::new(),
            )),
        }
    }

    pub fn spawn(interval: Duration, redis_pool: Pool<Connection>, log: logging::Logger) -> OnlineWriter {
        let state = Arc::new((
            Mutex::new(Shared {
                added: HashSet::new(),
                removed: HashSet::new(),
                signaled: false,
                running: true,
            }),
            Condvar::new(),
        ));

        let worker_state = state.clone();
        thread::spawn(move || loop {
            let (added, removed) = {
                let (lock, cvar) = &*worker_state;
                let mut shared = lock.lock().unwrap();
                if !shared.running {
                    return;
                }
                if !shared.signaled {
                    let (guard, _timeout) = cvar.wait_timeout(shared, interval).unwrap();
                    shared = guard;
                }
                if !shared.running {
                    return;
                }
                shared.signaled = false;
                let added: Vec<UserId> = shared.added.drain().collect();
                let removed: Vec<UserId> = shared.removed.drain().collect();
                (added, removed)
            };

            if added.is_empty() && removed.is_empty() {
                continue;
            }

            if let Err(e) = flush(&redis_pool, &added, &removed) {
                logging::warn!(log, "online-status flush failed"; "error" => %e);
            }
        });

        OnlineWriter { state }
    }

    /// Marks `uid` as touched; its claim TTL will be refreshed on the next
    /// tick.
    pub fn mark_active(&self, uid: UserId) {
        let (lock, _cvar) = &*self.state;
        let mut shared = lock.lock().unwrap();
        shared.removed.remove(&uid);
        shared.added.insert(uid);
    }

    /// Marks `uid` for removal and wakes the worker immediately, per C10's
    /// tombstone handling ("notify C13 to deregister the uid and flush
    /// now").
    pub fn mark_removed(&self, uid: UserId) {
        let (lock, cvar) = &*self.state;
        let mut shared = lock.lock().unwrap();
        shared.added.remove(&uid);
        shared.removed.insert(uid);
        shared.signaled = true;
        cvar.notify_one();
    }

    pub fn update_now(&self) {
        let (lock, cvar) = &*self.state;
        let mut shared = lock.lock().unwrap();
        shared.signaled = true;
        cvar.notify_one();
    }

    pub fn stop(&self) {
        let (lock, cvar) = &*self.state;
        let mut shared = lock.lock().unwrap();
        shared.running = false;
        cvar.notify_all();
    }
}

fn flush(redis_pool: &Pool<Connection>, added: &[UserId], removed: &[UserId]) -> flux::error::ChatResult<()> {
    let mut conn = redis_pool.acquire()?;
    for &uid in added {
        redischat::claim::refresh_ttl(&mut conn, uid, CLAIM_REFRESH_TTL_SECS)?;
    }
    for &uid in removed {
        redischat::claim::remove(&mut conn, uid)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_writer_accepts_marks_without_a_worker() {
        let writer = OnlineWriter::disabled();
        writer.mark_active(1);
        writer.mark_removed(2);
        writer.update_now();
    }
}
