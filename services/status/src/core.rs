//! Status RPC facade (C4): thin wrappers over the load balancer (C3) that
//! also trigger a mirror refresh whenever the heap's membership actually
//! changes (register, and a minimal-load pick that's about to be handed out).

use flux::error::ChatResult;
use flux::{logging, ServerId};
use loadindex::{LoadBalancer, ServerInfo};

use crate::mirror::Mirror;

pub struct StatusCore {
    balancer: LoadBalancer,
    mirror: Mirror,
    log: logging::Logger,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReportOutcome {
    Ok,
    NotFound,
}

impl StatusCore {
    pub fn new(mirror: Mirror, log: logging::Logger) -> StatusCore {
        StatusCore {
            balancer: LoadBalancer::new(),
            mirror,
            log,
        }
    }

    pub fn register_server(&self, id: ServerId, addr: String, load: u32) {
        logging::info!(self.log, "register_server"; "id" => id, "addr" => &addr, "load" => load);
        self.balancer.register_server(id, addr, load);
        self.mirror.update_now();
    }

    pub fn report_server_load(&self, id: ServerId, load: u32) -> ReportOutcome {
        if self.balancer.update_load(id, load) {
            ReportOutcome::Ok
        } else {
            logging::warn!(self.log, "report_server_load: unknown id"; "id" => id);
            ReportOutcome::NotFound
        }
    }

    pub fn check_minimal_load_server(&self) -> Option<ServerInfo> {
        let (result, did_evict) = self.balancer.min_load();
        if did_evict {
            self.mirror.update_now();
        }
        result
    }

    pub fn dump_server_list(&self) -> Vec<ServerInfo> {
        self.balancer.snapshot()
    }

    pub fn check_ttl_now(&self) -> usize {
        self.balancer.check_ttl()
    }

    pub fn snapshot_for_mirror(&self) -> Vec<ServerInfo> {
        self.balancer.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> StatusCore {
        StatusCore::new(Mirror::disabled(), flux::logging::init_default("status-test"))
    }

    #[test]
    fn register_then_check_minimal_returns_it() {
        let core = core();
        core.register_server(1, "a:1".into(), 5);
        let result = core.check_minimal_load_server();
        assert_eq!(result.unwrap().id, 1);
    }

    #[test]
    fn report_unknown_id_is_not_found() {
        let core = core();
        assert_eq!(core.report_server_load(99, 1), ReportOutcome::NotFound);
    }

    #[test]
    fn report_known_id_updates_load() {
        let core = core();
        core.register_server(1, "a".into(), 5);
        assert_eq!(core.report_server_load(1, 2), ReportOutcome::Ok);
        assert_eq!(core.dump_server_list()[0].load, 2);
    }

    #[test]
    fn dump_reflects_registrations() {
        let core = core();
        core.register_server(1, "a".into(), 1);
        core.register_server(2, "b".into(), 2);
        assert_eq!(core.dump_server_list().len(), 2);
    }
}
