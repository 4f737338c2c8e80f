//! Status mirror (C5): single worker, woken by a timer or an explicit
//! `update_now()`, that pushes the live-backend snapshot into Redis.
//! Signal-coalesced: concurrent `update_now()` calls while a push is in
//! flight collapse into one extra iteration, rather than queuing a run per
//! call.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use flux::logging;
use loadindex::ServerInfo;
use pool::Pool;
use redis::Connection;

const MAX_CONSECUTIVE_FAILURES: u32 = 3;

struct Shared {
    signaled: bool,
    running: bool,
}

/// A handle to the mirror worker. Cloning is cheap; every clone controls
/// the same background thread.
#[derive(Clone)]
pub struct Mirror {
    state: Arc<(Mutex<Shared>, Condvar)>,
}

impl Mirror {
    /// A mirror with no backing worker thread -- used in tests where Redis
    /// isn't available; `update_now` is a harmless no-op.
    pub fn disabled() -> Mirror {
        Mirror {
            state: Arc::new((
                Mutex::new(Shared {
                    signaled: false,
                    running: false,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Spawns the worker thread. `snapshot_fn` is called on every wake and
    /// is expected to have already run `CheckTTL` as part of producing the
    /// snapshot (see `StatusCore::new`'s `Arc::new_cyclic` wiring).
    pub fn spawn<F>(interval: Duration, redis_pool: Pool<Connection>, snapshot_fn: F, log: logging::Logger) -> Mirror
    where
        F: Fn() -> Vec<ServerInfo> + Send + 'static,
    {
        let state = Arc::new((
            Mutex::new(Shared {
                signaled: false,
                running: true,
            }),
            Condvar::new(),
        ));

        let worker_state = state.clone();
        thread::spawn(move || {
            let mut consecutive_failures = 0u32;

            loop {
                {
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
                }

                let snapshot = snapshot_fn();

                match push(&redis_pool, &snapshot) {
                    Ok(()) => consecutive_failures = 0,
                    Err(e) => {
                        consecutive_failures += 1;
                        logging::warn!(log, "mirror push failed"; "attempt" => consecutive_failures, "error" => %e);
                        if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                            logging::error!(log, "mirror push giving up after retries, continuing to run");
                            consecutive_failures = 0;
                        }
                    }
                }
            }
        });

        Mirror { state }
    }

    /// Wakes the worker immediately. Multiple calls while a push is in
    /// flight coalesce into a single extra iteration.
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

fn push(redis_pool: &Pool<Connection>, snapshot: &[ServerInfo]) -> flux::error::ChatResult<()> {
    let mut conn = redis_pool.acquire()?;
    redischat::serverlist::mirror(&mut conn, snapshot)
}
