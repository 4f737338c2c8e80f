//! Status reporter (C12): periodic worker that reports this backend's
//! session count to Status, re-registering if Status has forgotten this
//! backend entirely. Same timer+signal shape as the status mirror's
//! coalesced-wake worker: a manual `update_now()` cancels and reschedules
//! the timer instead of queuing a second run.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use flux::logging;
use flux::ServerId;
use statusclient::{ReportOutcome, StatusClient};

use crate::registry::Registry;

struct Shared {
    signaled: bool,
    running: bool,
}

#[derive(Clone)]
pub struct Reporter {
    state: Arc<(Mutex<Shared>, Condvar)>,
}

impl Reporter {
    pub fn spawn(
        server_id: ServerId,
        public_addr: String,
        interval: Duration,
        status: StatusClient,
        registry: Arc<Registry>,
        log: logging::Logger,
    ) -> Reporter {
        let state = Arc::new((Mutex::new(Shared { signaled: false, running: true }), Condvar::new()));
        let worker_state = state.clone();

        thread::spawn(move || loop {
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

            let (verified, temp) = registry.counts();
            let load = (verified + temp) as u32;

            match status.report_server_load(server_id, load) {
                Ok(ReportOutcome::Ok) => {}
                Ok(ReportOutcome::NotFound) => {
                    logging::warn!(log, "status forgot this backend, re-registering"; "server_id" => server_id);
                    if let Err(e) = status.register_server(server_id, &public_addr, load) {
                        logging::error!(log, "re-register failed"; "error" => %e);
                    }
                }
                Err(e) => {
                    logging::warn!(log, "status report failed"; "error" => %e);
                }
            }
        });

        Reporter { state }
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
